//! Command line parsing.

use std::path::PathBuf;

use lodestar_core::constants::DEFAULT_BACKBUFFER_COUNT;
use lodestar_core::{Error, LogLevel, Result};

/// Options accepted by the demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub validate: bool,
    pub fullscreen: bool,
    pub width: u32,
    pub height: u32,
    pub log_level: LogLevel,
    pub popups: bool,
    pub logfile: Option<PathBuf>,
    pub backbuffers: u32,
    pub vsync: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            validate: false,
            fullscreen: false,
            width: 320,
            height: 240,
            log_level: LogLevel::Error,
            popups: true,
            logfile: None,
            backbuffers: DEFAULT_BACKBUFFER_COUNT,
            vsync: true,
        }
    }
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Options),
    Help,
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--validate" => options.validate = true,
            "--fullscreen" => options.fullscreen = true,
            "--nopopups" => options.popups = false,
            "--novsync" => options.vsync = false,
            "--width" => options.width = parse_dimension("width", args.next())?,
            "--height" => options.height = parse_dimension("height", args.next())?,
            "--backbuffers" => {
                options.backbuffers = parse_number("backbuffer count", args.next())?;
            }
            "--loglevel" => options.log_level = parse_log_level(args.next())?,
            "--logfile" => {
                let path = args
                    .next()
                    .ok_or_else(|| Error::InvalidArgument("--logfile needs a path".into()))?;
                options.logfile = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Ok(Command::Help),
            other => return Err(Error::InvalidArgument(format!("unrecognized option {other}"))),
        }
    }

    Ok(Command::Run(options))
}

fn parse_number(what: &'static str, value: Option<String>) -> Result<u32> {
    let value = value.ok_or_else(|| Error::InvalidArgument(format!("missing {what}")))?;
    value
        .parse()
        .map_err(|_| Error::InvalidValue { what, value })
}

fn parse_dimension(what: &'static str, value: Option<String>) -> Result<u32> {
    match parse_number(what, value)? {
        0 => Err(Error::InvalidValue {
            what,
            value: "0".into(),
        }),
        n => Ok(n),
    }
}

/// Only the levels above the default are selectable.
fn parse_log_level(value: Option<String>) -> Result<LogLevel> {
    let value = value.ok_or_else(|| Error::InvalidArgument("missing log level".into()))?;
    match value.as_str() {
        "warn" => Ok(LogLevel::Warn),
        "info" => Ok(LogLevel::Info),
        "all" => Ok(LogLevel::All),
        _ => Err(Error::InvalidValue {
            what: "log level",
            value,
        }),
    }
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [OPTIONS]

OPTIONS:
    --fullscreen                Enable fullscreen render
    --validate                  Enable validation
    --loglevel <warn|info|all>  Enable logging of provided level and above
    --logfile <PATH>            Also write log output to PATH
    --nopopups                  Disable warning/error pop-ups on Windows
    --width <N>                 Set window width to N
    --height <N>                Set window height to N
    --backbuffers <N>           Number of swapchain images (default: {DEFAULT_BACKBUFFER_COUNT})
    --novsync                   Present without waiting for vertical blank
    -h, --help                  Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                    Override the log filter (e.g. info, lodestar_gpu=trace)"
    )
}
