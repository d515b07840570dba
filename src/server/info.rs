//! # System Diagnostics
//!
//! Host and relay status for the `/info` endpoint: hostname, OS, CPU,
//! memory, uptime, network interfaces and relay connection counts.
//!
//! On a Raspberry Pi the board model, revision, serial and CPU temperature are
//! added under `raspberryPi`. Each of those fields is left out when its source
//! file is missing.

use log::debug;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use sysinfo::{Networks, System};

use super::hub::RelayHub;

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const DEVICE_TREE_MODEL_PATH: &str = "/proc/device-tree/model";
const CPU_TEMPERATURE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Temperature {
    pub celsius: f64,
    pub fahrenheit: f64,
}

impl Temperature {
    /// Parse the kernel's thermal zone reading (millidegrees Celsius).
    fn from_millidegrees(raw: &str) -> Option<Self> {
        let milli: i64 = raw.trim().parse().ok()?;
        let celsius = milli as f64 / 1000.0;
        Some(Self {
            celsius,
            fahrenheit: celsius * 9.0 / 5.0 + 32.0,
        })
    }
}

/// Board identity as exposed by Raspberry Pi firmware.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Temperature>,
}

impl BoardInfo {
    /// Read the board files. `None` when none of them yield anything.
    pub async fn read() -> Option<Self> {
        let cpuinfo = read_optional(CPUINFO_PATH).await;
        let device_model = read_optional(DEVICE_TREE_MODEL_PATH).await;
        let temperature = read_optional(CPU_TEMPERATURE_PATH).await;

        let board = Self::from_sources(
            cpuinfo.as_deref(),
            device_model.as_deref(),
            temperature.as_deref(),
        );
        (board != Self::default()).then_some(board)
    }

    fn from_sources(
        cpuinfo: Option<&str>,
        device_model: Option<&str>,
        temperature: Option<&str>,
    ) -> Self {
        let field = |key: &str| cpuinfo.and_then(|text| cpuinfo_field(text, key));
        Self {
            model: field("Model"),
            revision: field("Revision"),
            serial: field("Serial"),
            // Device-tree strings are NUL-terminated
            device_model: device_model
                .map(|m| m.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
                .filter(|m| !m.is_empty()),
            temperature: temperature.and_then(Temperature::from_millidegrees),
        }
    }
}

/// Value of a `Key : value` line in `/proc/cpuinfo`. Keys match exactly, so
/// the Pi's `Model` line is not confused with x86's `model`.
fn cpuinfo_field(cpuinfo: &str, key: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        let value = value.trim();
        (name.trim() == key && !value.is_empty()).then(|| value.to_string())
    })
}

async fn read_optional(path: &str) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("📄 {} unavailable: {}", path, e);
            None
        }
    }
}

fn network_interfaces() -> serde_json::Value {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<_> = networks
        .iter()
        .map(|(name, data)| {
            json!({
                "name": name,
                "mac": data.mac_address().to_string(),
                "received": data.total_received(),
                "transmitted": data.total_transmitted(),
            })
        })
        .collect();
    interfaces.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    json!(interfaces)
}

/// Cached `sysinfo` handle; refreshed on every snapshot.
#[derive(Clone)]
pub struct SystemInfo {
    system: Arc<Mutex<System>>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemInfo {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new_all())),
        }
    }

    /// Collect a JSON snapshot of the host and the relay.
    pub async fn snapshot(&self, hub: &RelayHub) -> serde_json::Value {
        let (web_clients, device_clients) = hub.counts().await;

        let host = {
            let mut sys = match self.system.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            sys.refresh_cpu_all();
            sys.refresh_memory();

            let cpus = sys.cpus();
            let load = System::load_average();
            json!({
                "system": {
                    "hostname": System::host_name(),
                    "os": System::name(),
                    "osVersion": System::os_version(),
                    "kernel": System::kernel_version(),
                    "arch": std::env::consts::ARCH,
                    "uptime": System::uptime(),
                    "loadAverage": [load.one, load.five, load.fifteen],
                },
                "cpu": {
                    "model": cpus.first().map(|c| c.brand().to_string()).unwrap_or_else(|| "Unknown".to_string()),
                    "cores": cpus.len(),
                    "speed": cpus.first().map(|c| c.frequency()).unwrap_or(0),
                    "usage": sys.global_cpu_usage(),
                },
                "memory": {
                    "total": sys.total_memory(),
                    "free": sys.free_memory(),
                    "available": sys.available_memory(),
                    "used": sys.used_memory(),
                },
            })
        };

        let mut snapshot = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "host": host,
            "network": network_interfaces(),
            "relay": {
                "webClients": web_clients,
                "deviceClients": device_clients,
                "stats": hub.stats().snapshot(),
            },
        });
        if let Some(board) = BoardInfo::read().await {
            snapshot["raspberryPi"] = json!(board);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::RelaySettings;

    #[tokio::test]
    async fn test_snapshot_reports_relay_counts() {
        let hub = RelayHub::new(RelaySettings::default());
        let info = SystemInfo::new();

        let snapshot = info.snapshot(&hub).await;

        assert_eq!(snapshot["relay"]["webClients"], 0);
        assert_eq!(snapshot["relay"]["deviceClients"], 0);
        assert!(snapshot["host"]["memory"]["total"].is_u64());
        assert!(snapshot["network"].is_array());
        assert_eq!(snapshot["version"], env!("CARGO_PKG_VERSION"));
    }

    const PI_CPUINFO: &str = "processor\t: 0\n\
BogoMIPS\t: 108.00\n\
Features\t: fp asimd evtstrm crc32 cpuid\n\
\n\
Hardware\t: BCM2835\n\
Revision\t: c03111\n\
Serial\t\t: 10000000a1b2c3d4\n\
Model\t\t: Raspberry Pi 4 Model B Rev 1.1\n";

    #[test]
    fn test_board_info_from_pi_files() {
        let board = BoardInfo::from_sources(
            Some(PI_CPUINFO),
            Some("Raspberry Pi 4 Model B Rev 1.1\0"),
            Some("48312\n"),
        );

        assert_eq!(board.model.as_deref(), Some("Raspberry Pi 4 Model B Rev 1.1"));
        assert_eq!(board.revision.as_deref(), Some("c03111"));
        assert_eq!(board.serial.as_deref(), Some("10000000a1b2c3d4"));
        assert_eq!(board.device_model.as_deref(), Some("Raspberry Pi 4 Model B Rev 1.1"));

        let temperature = board.temperature.unwrap();
        assert!((temperature.celsius - 48.312).abs() < 1e-9);
        assert!((temperature.fahrenheit - 118.9616).abs() < 1e-9);
    }

    #[test]
    fn test_board_info_omits_missing_fields() {
        // x86 cpuinfo: lowercase `model` is a CPU model number, not a board
        let board = BoardInfo::from_sources(
            Some("processor\t: 0\nmodel\t\t: 142\nmodel name\t: Intel(R) Core(TM)\n"),
            None,
            Some("not a number"),
        );
        assert_eq!(board, BoardInfo::default());

        let value = serde_json::to_value(BoardInfo {
            serial: Some("abc".to_string()),
            ..BoardInfo::default()
        })
        .unwrap();
        assert_eq!(value, json!({ "serial": "abc" }));
    }
}
