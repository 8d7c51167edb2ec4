//! Lodestar clear-screen demo.
//!
//! Brings up the Vulkan instance, device, queues and swapchain, then clears
//! every swapchain image to a slowly cycling colour.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lodestar-demo -- [OPTIONS]
//! ```
//!
//! Run with `--help` for the option list.

mod app;
mod cli;

use std::process::ExitCode;

use lodestar_app::{run_app, AppConfig};

use crate::app::ClearDemo;
use crate::cli::{parse_args, usage, Command};

const TITLE: &str = "Lodestar Demo";

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "lodestar-demo".to_string());

    let options = match parse_args(args) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            eprintln!("{}", usage(&program));
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}\n");
            eprintln!("{}", usage(&program));
            return ExitCode::FAILURE;
        }
    };

    let mut config = AppConfig::new(TITLE)
        .with_size(options.width, options.height)
        .with_fullscreen(options.fullscreen)
        .with_validation(options.validate)
        .with_vsync(options.vsync)
        .with_backbuffers(options.backbuffers)
        .with_log_level(options.log_level)
        .with_popups(options.popups);
    if let Some(path) = options.logfile {
        config = config.with_logfile(path);
    }

    match run_app::<ClearDemo>(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{TITLE} failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
