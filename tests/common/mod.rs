//! Shared helpers for integration tests: a scripted command runner and a
//! module context backed by a temporary backup directory.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use nettune::backup::BackupStore;
use nettune::config::Config;
use nettune::modules::ModuleContext;
use nettune::system::{CommandOutput, CommandRunner, CommandSpec};
use nettune::Result;

pub const ETHERNET_GUID: &str = "{6A1F0D2C-1B2E-4C8B-9E0A-0F1E2D3C4B5A}";
pub const WIFI_GUID: &str = "{0B7C9E11-55D2-4F0A-8A3B-2C4D6E8F0A1B}";

/// `Get-NetAdapter` JSON for a wired and a wireless adapter.
pub fn adapters_json() -> String {
    format!(
        r#"[{{"Name":"Ethernet","InterfaceDescription":"Intel(R) Ethernet Connection I219-V","ifIndex":12,"Status":"Up","InterfaceGuid":"{}","MacAddress":"00-1A-2B-3C-4D-5E"}},{{"Name":"Wi-Fi","InterfaceDescription":"Intel(R) Wi-Fi 6 AX201 160MHz","ifIndex":7,"Status":"Disconnected","InterfaceGuid":"{}","MacAddress":"00-1A-2B-3C-4D-5F"}}]"#,
        ETHERNET_GUID, WIFI_GUID
    )
}

/// A single wired adapter.
pub fn single_adapter_json() -> String {
    format!(
        r#"{{"Name":"Ethernet","InterfaceDescription":"Realtek PCIe GbE Family Controller","ifIndex":12,"Status":"Up","InterfaceGuid":"{}","MacAddress":"00-1A-2B-3C-4D-5E"}}"#,
        ETHERNET_GUID
    )
}

/// `reg query` output for one value.
pub fn reg_value(name: &str, kind: &str, data: &str) -> String {
    format!(
        "\nHKEY_LOCAL_MACHINE\\SYSTEM\\CurrentControlSet\\Services\\Tcpip\\Parameters\n    {}    {}    {}\n\n",
        name, kind, data
    )
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fail(code: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// reg.exe's answer for a missing value.
pub fn not_found() -> CommandOutput {
    fail(
        1,
        "ERROR: The system was unable to find the specified registry key or value.",
    )
}

struct Rule {
    pattern: String,
    responses: Vec<CommandOutput>,
}

/// Serves canned output for commands whose command line contains a
/// pattern. Rules are checked in insertion order; a rule with several
/// responses serves them in turn and repeats the last. Unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.on_seq(pattern, vec![output])
    }

    pub fn on_seq(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            responses: outputs,
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    pub fn called(&self, pattern: &str) -> bool {
        !self.calls_matching(pattern).is_empty()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.display();
        self.calls.lock().unwrap().push(line.clone());

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if line.contains(&rule.pattern) {
                if rule.responses.len() > 1 {
                    return Ok(rule.responses.remove(0));
                }
                return Ok(rule.responses.first().cloned().unwrap_or_else(|| ok("")));
            }
        }
        Ok(ok(""))
    }
}

/// Config that keeps tests off the real machine: no temp cleanup, no
/// service waits, and connectivity checks aimed at localhost.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tuning.clean_temp = false;
    config.tuning.services.clear();
    config.tuning.tray_apps = vec!["onedrive.exe".to_string()];
    config.tcp.check_host = "127.0.0.1".to_string();
    config.tcp.check_port = 9;
    config
}

/// A context around `runner` with backups in a fresh temp dir. Keep the
/// returned `TempDir` alive for the duration of the test.
pub fn context(runner: Arc<ScriptedRunner>, config: Config) -> (ModuleContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let backups = BackupStore::new(dir.path().join("backups"));
    let ctx = ModuleContext::new(runner, config, backups);
    (ctx, dir)
}
