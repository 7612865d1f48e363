//! Device discovery and target selection
//!
//! Scans for the configured window, snapshots every advertisement seen,
//! and picks the strongest-signal peripheral whose name marks it as a
//! BLUFI target.

use std::time::Duration;

use btleplug::api::{Central, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Peripheral};
use log::info;

use crate::AttackError;

/// Advertised-name keywords that mark a peripheral as a BLUFI target.
/// Matching is case-insensitive.
pub const TARGET_KEYWORDS: [&str; 4] = ["ESP", "BLUFI", "ESP32", "BLYNK"];

/// One peripheral observed during the scan window.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub address: String,
    pub name: String,
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// RSSI for display; devices that never reported one show "N/A".
    pub fn rssi_display(&self) -> String {
        self.rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Scan for `duration`, then snapshot every peripheral the adapter saw.
///
/// Returns the platform peripherals alongside their observed records so
/// a selected index maps back to a connectable handle.
pub async fn scan_devices(
    adapter: &Adapter,
    duration: Duration,
) -> Result<(Vec<Peripheral>, Vec<DiscoveredDevice>), AttackError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::with_capacity(peripherals.len());

    for peripheral in &peripherals {
        let props = peripheral.properties().await?;
        let name = props
            .as_ref()
            .and_then(|p| p.local_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let rssi = props.as_ref().and_then(|p| p.rssi);

        devices.push(DiscoveredDevice {
            address: peripheral.address().to_string(),
            name,
            rssi,
        });
    }

    adapter.stop_scan().await?;
    Ok((peripherals, devices))
}

/// True when an advertised name contains one of [`TARGET_KEYWORDS`].
pub fn is_candidate(name: &str) -> bool {
    let name = name.to_uppercase();
    TARGET_KEYWORDS.iter().any(|keyword| name.contains(keyword))
}

/// Pick the best target: strongest RSSI among keyword-matching devices,
/// first observed wins ties. Returns an index into `devices`.
pub fn select_target(devices: &[DiscoveredDevice]) -> Option<usize> {
    let mut best: Option<usize> = None;

    for (idx, device) in devices.iter().enumerate() {
        if !is_candidate(&device.name) {
            continue;
        }
        info!(
            "found: {} | {} | RSSI: {}",
            device.address,
            device.name,
            device.rssi_display()
        );

        let rssi = device.rssi.unwrap_or(i16::MIN);
        let beats_best = match best {
            Some(b) => rssi > devices[b].rssi.unwrap_or(i16::MIN),
            None => true,
        };
        if beats_best {
            best = Some(idx);
        }
    }

    if let Some(idx) = best {
        let target = &devices[idx];
        info!(
            "target: {} | {} | RSSI: {}",
            target.address,
            target.name,
            target.rssi_display()
        );
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(address: &str, name: &str, rssi: i16) -> DiscoveredDevice {
        DiscoveredDevice {
            address: address.to_string(),
            name: name.to_string(),
            rssi: Some(rssi),
        }
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(is_candidate("esp32-dev"));
        assert!(is_candidate("BLUFI_DEVICE"));
        assert!(is_candidate("my blynk kit"));
        assert!(!is_candidate("Unknown"));
        assert!(!is_candidate("foo"));
    }

    #[test]
    fn strongest_matching_device_wins() {
        let devices = vec![
            device("AA:00:00:00:00:01", "foo", -80),
            device("AA:00:00:00:00:02", "ESP32-dev", -60),
            device("AA:00:00:00:00:03", "BLUFI", -90),
        ];
        assert_eq!(select_target(&devices), Some(1));
    }

    #[test]
    fn first_observed_wins_ties() {
        let devices = vec![
            device("AA:00:00:00:00:01", "ESP-a", -70),
            device("AA:00:00:00:00:02", "ESP-b", -70),
        ];
        assert_eq!(select_target(&devices), Some(0));
    }

    #[test]
    fn missing_rssi_ranks_below_any_reported_value() {
        let devices = vec![
            DiscoveredDevice {
                address: "AA:00:00:00:00:01".to_string(),
                name: "ESP-quiet".to_string(),
                rssi: None,
            },
            device("AA:00:00:00:00:02", "ESP-loud", -95),
        ];
        assert_eq!(select_target(&devices), Some(1));
    }

    #[test]
    fn no_matching_device_is_none() {
        assert_eq!(select_target(&[]), None);
        assert_eq!(
            select_target(&[device("AA:00:00:00:00:01", "foo", -10)]),
            None
        );
    }
}
