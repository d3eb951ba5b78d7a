//! User preferences persistence.
//!
//! Saves/loads a JSON config at `<config dir>/nettune/config.json`.
//! Failures never surface to the user, the app always has sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::modules::dns::DnsProvider;

/// Persisted user preferences.
///
/// Every field has a serde default so that adding new fields later
/// doesn't break old config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Write debug-level entries to the log file.
    pub debug_logging: bool,

    /// Override for the log directory (None = `<data dir>/nettune/logs`).
    pub log_dir: Option<PathBuf>,

    pub dns: DnsConfig,
    pub mtu: MtuConfig,
    pub tcp: TcpConfig,
    pub tuning: TuningConfig,
    pub repair: RepairConfig,
    pub ssl: SslConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub provider: DnsProvider,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            provider: DnsProvider::Cloudflare,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtuConfig {
    /// MTU applied when probing is off.
    pub target: u32,
    /// Probe the path MTU instead of using `target`.
    pub auto_probe: bool,
    pub probe_host: String,
    pub probe_max: u32,
    pub probe_min: u32,
}

impl Default for MtuConfig {
    fn default() -> Self {
        Self {
            target: 1450,
            auto_probe: false,
            probe_host: "8.8.8.8".into(),
            probe_max: 1500,
            probe_min: 1300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub max_data_retransmissions: u32,
    /// Keep-alive interval in milliseconds.
    pub keep_alive_time: u32,
    pub check_host: String,
    pub check_port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_data_retransmissions: 10,
            keep_alive_time: 7_200_000,
            check_host: "8.8.8.8".into(),
            check_port: 53,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Days to pause Windows Update for (1-35).
    pub pause_days: u32,
    /// Image names of tray applications to close.
    pub tray_apps: Vec<String>,
    /// Background services to stop.
    pub services: Vec<String>,
    pub clean_temp: bool,
    pub network_tweaks: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            pause_days: 7,
            tray_apps: [
                "steam.exe",
                "steamwebhelper.exe",
                "epicgameslauncher.exe",
                "onedrive.exe",
                "googledrivesync.exe",
                "dropbox.exe",
                "utorrent.exe",
                "bittorrent.exe",
                "qbittorrent.exe",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            services: ["wuauserv", "UsoSvc", "DoSvc", "BITS"]
                .into_iter()
                .map(String::from)
                .collect(),
            clean_temp: true,
            network_tweaks: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Drive checked by CHKDSK, e.g. `C:`.
    pub drive: String,
    /// Pass `/ResetBase` to component cleanup.
    pub reset_base: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            drive: "C:".into(),
            reset_base: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    /// Also empty the personal (`My`) certificate store.
    pub clear_personal_store: bool,
}

impl Config {
    /// Config file path: `<config dir>/nettune/config.json`.
    ///
    /// Returns `None` if the config directory can't be determined.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("nettune").join("config.json"))
    }

    /// Directory holding backups and logs: `<data dir>/nettune`.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("nettune")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("logs"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        Self::data_dir().join("backups")
    }

    /// Load config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = fs::read_to_string(path) else {
            return Self::default();
        };

        serde_json::from_str(&contents).unwrap_or_default()
    }

    /// Save config to disk. Creates parent directories if needed.
    /// Best-effort: errors are logged and swallowed.
    pub fn save(&self) {
        let Some(path) = Self::path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            tracing::warn!("Could not save config to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tool_values() {
        let config = Config::default();
        assert_eq!(config.mtu.target, 1450);
        assert_eq!(config.tcp.max_data_retransmissions, 10);
        assert_eq!(config.tcp.keep_alive_time, 7_200_000);
        assert_eq!(config.tuning.pause_days, 7);
        assert_eq!(config.dns.provider, DnsProvider::Cloudflare);
        assert!(!config.ssl.clear_personal_store);
        assert!(config.tuning.services.iter().any(|s| s == "wuauserv"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{ "mtu": { "target": 1400 } }"#).unwrap();
        assert_eq!(config.mtu.target, 1400);
        assert_eq!(config.mtu.probe_host, "8.8.8.8");
        assert_eq!(config.repair.drive, "C:");
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.dns.provider = DnsProvider::Quad9;
        config.tuning.pause_days = 14;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.dns.provider, DnsProvider::Quad9);
        assert_eq!(loaded.tuning.pause_days, 14);
    }

    #[test]
    fn test_garbage_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(Config::load_from(&path).mtu.target, 1450);
    }
}
