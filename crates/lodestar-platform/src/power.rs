//! Host power-source status.
//!
//! On Linux the first battery under `/sys/class/power_supply` is consulted.
//! Other targets report [`BatteryStatus::None`].

use lodestar_core::BatteryStatus;

/// Classify a battery from its `status` and `capacity` attributes.
///
/// A battery that is charging, full or held by the charger counts as
/// external power. A discharging battery is graded by its charge level.
pub fn classify(status: &str, capacity: Option<u8>) -> BatteryStatus {
    match status.trim() {
        "Charging" | "Full" | "Not charging" => BatteryStatus::Charging,
        "Discharging" => capacity.map_or(BatteryStatus::Low, BatteryStatus::from_discharge_level),
        _ => BatteryStatus::None,
    }
}

/// Current power-source status of the host.
pub fn battery_status() -> BatteryStatus {
    let status = query();
    tracing::debug!("Power status: {status:?}");
    status
}

#[cfg(target_os = "linux")]
fn query() -> BatteryStatus {
    use std::fs;
    use std::path::Path;

    let root = Path::new("/sys/class/power_supply");
    let Ok(entries) = fs::read_dir(root) else {
        return BatteryStatus::None;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_battery = fs::read_to_string(path.join("type"))
            .is_ok_and(|kind| kind.trim() == "Battery");
        if !is_battery {
            continue;
        }

        let Ok(status) = fs::read_to_string(path.join("status")) else {
            continue;
        };
        let capacity = fs::read_to_string(path.join("capacity"))
            .ok()
            .and_then(|value| value.trim().parse::<u8>().ok());
        return classify(&status, capacity);
    }

    BatteryStatus::None
}

#[cfg(not(target_os = "linux"))]
fn query() -> BatteryStatus {
    BatteryStatus::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_power_states() {
        for status in ["Charging", "Full", "Not charging\n"] {
            assert_eq!(classify(status, Some(12)), BatteryStatus::Charging);
        }
    }

    #[test]
    fn discharging_is_graded() {
        assert_eq!(classify("Discharging\n", Some(90)), BatteryStatus::High);
        assert_eq!(classify("Discharging", Some(50)), BatteryStatus::Mid);
        assert_eq!(classify("Discharging", Some(20)), BatteryStatus::Low);
        assert_eq!(classify("Discharging", Some(3)), BatteryStatus::Critical);
        assert_eq!(classify("Discharging", None), BatteryStatus::Low);
    }

    #[test]
    fn unknown_status_means_no_battery() {
        assert_eq!(classify("Unknown", Some(80)), BatteryStatus::None);
        assert!(classify("", None).on_external_power());
    }
}
