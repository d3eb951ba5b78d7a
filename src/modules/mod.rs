//! Tuning modules.
//!
//! Each module reads the current setting, writes the new one, reads it back
//! and reports. Modules share nothing but the OS state they touch.

pub mod dns;
pub mod lso;
pub mod mtu;
pub mod power;
pub mod repair;
pub mod reset;
pub mod ssl;
pub mod tcp;
pub mod tuning;

use std::fmt;
use std::sync::Arc;

use crate::backup::BackupStore;
use crate::config::Config;
use crate::system::CommandRunner;

/// Everything a module needs to run.
#[derive(Clone)]
pub struct ModuleContext {
    pub runner: Arc<dyn CommandRunner>,
    pub config: Config,
    pub backups: BackupStore,
}

impl ModuleContext {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Config, backups: BackupStore) -> Self {
        Self {
            runner,
            config,
            backups,
        }
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }
}

/// Identifies a tuning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Dns,
    Lso,
    Mtu,
    Power,
    Reset,
    Ssl,
    Tuning,
    Repair,
    Tcp,
}

impl ModuleId {
    /// Menu order (options 1-9).
    pub const ALL: [ModuleId; 9] = [
        ModuleId::Dns,
        ModuleId::Lso,
        ModuleId::Mtu,
        ModuleId::Power,
        ModuleId::Reset,
        ModuleId::Ssl,
        ModuleId::Tuning,
        ModuleId::Repair,
        ModuleId::Tcp,
    ];

    /// Order used by "run all": the stack reset goes first so later
    /// settings land on a clean stack; slow repair tools go last.
    pub const RUN_ALL_ORDER: [ModuleId; 9] = [
        ModuleId::Reset,
        ModuleId::Ssl,
        ModuleId::Dns,
        ModuleId::Lso,
        ModuleId::Mtu,
        ModuleId::Power,
        ModuleId::Tcp,
        ModuleId::Tuning,
        ModuleId::Repair,
    ];

    pub fn menu_number(self) -> u8 {
        match self {
            ModuleId::Dns => 1,
            ModuleId::Lso => 2,
            ModuleId::Mtu => 3,
            ModuleId::Power => 4,
            ModuleId::Reset => 5,
            ModuleId::Ssl => 6,
            ModuleId::Tuning => 7,
            ModuleId::Repair => 8,
            ModuleId::Tcp => 9,
        }
    }

    pub fn from_menu_number(n: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.menu_number() == n)
    }

    /// Short machine name, used for backup files.
    pub fn key(self) -> &'static str {
        match self {
            ModuleId::Dns => "dns",
            ModuleId::Lso => "lso",
            ModuleId::Mtu => "mtu",
            ModuleId::Power => "power",
            ModuleId::Reset => "reset",
            ModuleId::Ssl => "ssl",
            ModuleId::Tuning => "tuning",
            ModuleId::Repair => "repair",
            ModuleId::Tcp => "tcp",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ModuleId::Dns => "Set DNS servers",
            ModuleId::Lso => "Disable Large Send Offload",
            ModuleId::Mtu => "Adjust MTU",
            ModuleId::Power => "Disable adapter power saving",
            ModuleId::Reset => "Reset network stack",
            ModuleId::Ssl => "Clear SSL/TLS caches",
            ModuleId::Tuning => "System tuning",
            ModuleId::Repair => "Repair system files",
            ModuleId::Tcp => "Adjust TCP timeouts",
        }
    }

    /// Lines shown on the confirmation screen.
    pub fn details(self) -> &'static [&'static str] {
        match self {
            ModuleId::Dns => &[
                "Points every enabled adapter at the configured DNS provider.",
                "Current servers are saved first and can be restored with revert.",
                "The resolver cache is flushed afterwards.",
            ],
            ModuleId::Lso => &[
                "Turns off IPv4 and IPv6 Large Send Offload on capable adapters.",
                "Some drivers batch outgoing segments in ways that add latency.",
                "Adapters briefly reconnect while the setting changes.",
            ],
            ModuleId::Mtu => &[
                "Sets the IPv4 MTU of connected interfaces (default 1450).",
                "Optionally probes the path MTU with don't-fragment pings.",
                "Previous values are saved for revert.",
            ],
            ModuleId::Power => &[
                "Stops Windows from powering down network adapters to save energy.",
                "Writes PnPCapabilities in each adapter's driver key.",
                "Takes effect after a restart.",
            ],
            ModuleId::Reset => &[
                "Releases and renews DHCP leases, resets Winsock and the TCP/IP",
                "stack, then flushes the DNS cache.",
                "Active connections drop. A restart is needed afterwards.",
            ],
            ModuleId::Ssl => &[
                "Deletes the CryptoAPI URL cache and cached intermediate",
                "certificates so chains are rebuilt on next use.",
                "Personal certificates are kept unless enabled in config.",
            ],
            ModuleId::Tuning => &[
                "Pauses Windows Update, stops update services and closes",
                "configured tray applications.",
                "Also empties temp folders and applies TCP/IP port tuning.",
            ],
            ModuleId::Repair => &[
                "Runs CHKDSK, SFC and DISM health restore plus component cleanup.",
                "This can take a long time. CHKDSK on the system drive is",
                "scheduled for the next restart.",
            ],
            ModuleId::Tcp => &[
                "Sets TcpMaxDataRetransmissions and KeepAliveTime.",
                "Previous values are saved for revert.",
                "Runs a short connectivity check afterwards.",
            ],
        }
    }

    pub fn supports_revert(self) -> bool {
        matches!(
            self,
            ModuleId::Dns
                | ModuleId::Lso
                | ModuleId::Mtu
                | ModuleId::Power
                | ModuleId::Tuning
                | ModuleId::Tcp
        )
    }
}

/// A context with backups in a fresh temp dir. Keep the returned `TempDir`
/// alive for the duration of the test.
#[cfg(test)]
pub(crate) fn test_context(
    runner: Arc<dyn CommandRunner>,
    config: Config,
) -> (ModuleContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let backups = BackupStore::new(dir.path().join("backups"));
    (ModuleContext::new(runner, config, backups), dir)
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_numbers_round_trip() {
        for (i, id) in ModuleId::ALL.iter().enumerate() {
            assert_eq!(id.menu_number() as usize, i + 1);
            assert_eq!(ModuleId::from_menu_number(id.menu_number()), Some(*id));
        }
        assert_eq!(ModuleId::from_menu_number(0), None);
        assert_eq!(ModuleId::from_menu_number(10), None);
    }

    #[test]
    fn test_run_all_covers_every_module_once() {
        let mut order = ModuleId::RUN_ALL_ORDER.to_vec();
        order.sort_by_key(|m| m.menu_number());
        assert_eq!(order, ModuleId::ALL.to_vec());
        assert_eq!(ModuleId::RUN_ALL_ORDER[0], ModuleId::Reset);
        assert_eq!(ModuleId::RUN_ALL_ORDER[8], ModuleId::Repair);
    }
}
