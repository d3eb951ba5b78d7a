//! Large Send Offload.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::adapters::detect_adapters;
use crate::system::powershell::{parse_json_list, quote};
use crate::system::{CommandRunner, CommandSpec};

const QUERY_SCRIPT: &str = "Get-NetAdapterLso -ErrorAction SilentlyContinue | \
Select-Object Name, IPv4Enabled, IPv6Enabled | ConvertTo-Json -Compress";

/// LSO state of one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsoState {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4Enabled", default)]
    pub ipv4_enabled: bool,
    #[serde(rename = "IPv6Enabled", default)]
    pub ipv6_enabled: bool,
}

impl LsoState {
    pub fn is_disabled(&self) -> bool {
        !self.ipv4_enabled && !self.ipv6_enabled
    }
}

/// LSO-capable adapters that are enabled.
pub async fn query(runner: &dyn CommandRunner) -> Result<Vec<LsoState>> {
    let output = runner
        .run_checked(&CommandSpec::powershell(QUERY_SCRIPT))
        .await?;
    let states: Vec<LsoState> = parse_json_list(&output.stdout)?;

    // Disabled adapters still report LSO properties; skip them.
    let usable = match detect_adapters(runner).await {
        Ok(adapters) => adapters,
        Err(e) => {
            tracing::debug!("Adapter detection failed, keeping all LSO entries: {}", e);
            return Ok(states);
        }
    };
    Ok(states
        .into_iter()
        .filter(|s| usable.iter().any(|a| a.name == s.name))
        .collect())
}

async fn set_lso(runner: &dyn CommandRunner, state: &LsoState, enable: bool) -> Result<()> {
    let verb = if enable { "Enable" } else { "Disable" };
    let mut script = format!("{}-NetAdapterLso -Name {}", verb, quote(&state.name));
    if !enable || state.ipv4_enabled {
        script.push_str(" -IPv4");
    }
    if !enable || state.ipv6_enabled {
        script.push_str(" -IPv6");
    }
    script.push_str(" -Confirm:$false");
    runner.run_checked(&CommandSpec::powershell(script)).await?;
    Ok(())
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let before = query(runner).await?;

    if before.is_empty() {
        return Ok(ModuleReport::new(
            ModuleId::Lso,
            false,
            "No adapters support Large Send Offload",
        ));
    }
    ctx.backups.save_best_effort(ModuleId::Lso.key(), &before);

    let mut steps = Vec::new();
    let mut attempted = Vec::new();
    for state in &before {
        if state.is_disabled() {
            steps.push(StepOutcome::ok(&state.name, "already disabled"));
            continue;
        }
        match set_lso(runner, state, false).await {
            Ok(()) => attempted.push(state.name.clone()),
            Err(e) => {
                tracing::warn!("Disabling LSO on {} failed: {}", state.name, e);
                steps.push(StepOutcome::failed(&state.name, e.to_string()));
            }
        }
    }

    if !attempted.is_empty() {
        let after = query(runner).await?;
        for name in &attempted {
            match after.iter().find(|s| &s.name == name) {
                Some(s) if s.is_disabled() => {
                    tracing::info!("LSO disabled on {}", name);
                    steps.push(StepOutcome::ok(name, "IPv4/IPv6 LSO disabled"));
                }
                Some(s) => steps.push(StepOutcome::failed(
                    name,
                    format!(
                        "still enabled (IPv4={}, IPv6={})",
                        s.ipv4_enabled, s.ipv6_enabled
                    ),
                )),
                None => steps.push(StepOutcome::failed(name, "adapter vanished after change")),
            }
        }
    }

    let verified = steps.iter().filter(|s| s.success).count();
    let failed = steps.len() - verified;
    let success = verified > 0 && failed == 0;
    let message = format!("LSO disabled on {}/{} adapter(s)", verified, before.len());
    Ok(ModuleReport::new(ModuleId::Lso, success, message).with_steps(steps))
}

pub async fn revert(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let snapshot = ctx.backups.load::<Vec<LsoState>>(ModuleId::Lso.key())?;

    let to_enable: Vec<&LsoState> = snapshot.data.iter().filter(|s| !s.is_disabled()).collect();
    if to_enable.is_empty() {
        return Ok(ModuleReport::new(
            ModuleId::Lso,
            true,
            "LSO was already off everywhere before the change",
        ));
    }

    let mut steps = Vec::new();
    for state in &to_enable {
        if let Err(e) = set_lso(runner, state, true).await {
            steps.push(StepOutcome::failed(&state.name, e.to_string()));
        }
    }

    let after = query(runner).await?;
    for state in &to_enable {
        if steps.iter().any(|s| s.name == state.name) {
            continue;
        }
        let restored = after.iter().any(|s| {
            s.name == state.name
                && s.ipv4_enabled == state.ipv4_enabled
                && s.ipv6_enabled == state.ipv6_enabled
        });
        steps.push(if restored {
            StepOutcome::ok(&state.name, "LSO re-enabled")
        } else {
            StepOutcome::failed(&state.name, "did not read back as enabled")
        });
    }

    let restored = steps.iter().filter(|s| s.success).count();
    let message = format!("LSO restored on {}/{} adapter(s)", restored, to_enable.len());
    Ok(ModuleReport::new(ModuleId::Lso, restored == to_enable.len(), message).with_steps(steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::modules::test_context;
    use crate::system::command::fake::{ok, ScriptedRunner};

    const ADAPTERS: &str = r#"[
        {"Name":"Ethernet","InterfaceDescription":"Intel(R) Ethernet","ifIndex":12,"Status":"Up","InterfaceGuid":"{AAAA}","MacAddress":"00-11-22-33-44-55"},
        {"Name":"Wi-Fi","InterfaceDescription":"Killer Wireless","ifIndex":7,"Status":"Up","InterfaceGuid":"{BBBB}","MacAddress":"66-77-88-99-AA-BB"}
    ]"#;

    fn lso(ethernet: bool, wifi: bool) -> String {
        format!(
            r#"[{{"Name":"Ethernet","IPv4Enabled":{e},"IPv6Enabled":{e}}},{{"Name":"Wi-Fi","IPv4Enabled":{w},"IPv6Enabled":{w}}}]"#,
            e = ethernet,
            w = wifi
        )
    }

    fn runner(before: String, after: String) -> Arc<ScriptedRunner> {
        Arc::new(
            ScriptedRunner::new()
                .on_seq("Get-NetAdapterLso", vec![ok(&before), ok(&after)])
                .on("Get-NetAdapter |", ok(ADAPTERS)),
        )
    }

    #[test]
    fn test_parse_lso_state() {
        let states: Vec<LsoState> = parse_json_list(
            r#"[{"Name":"Ethernet","IPv4Enabled":true,"IPv6Enabled":true},{"Name":"Wi-Fi","IPv4Enabled":false,"IPv6Enabled":false}]"#,
        )
        .unwrap();
        assert!(!states[0].is_disabled());
        assert!(states[1].is_disabled());
    }

    #[tokio::test]
    async fn test_already_disabled_adapter_counts_as_verified() {
        let runner = runner(lso(true, false), lso(false, false));
        let (ctx, _dir) = test_context(runner.clone(), Config::default());

        let report = apply(&ctx).await.unwrap();

        assert!(report.success, "{}", report.message);
        assert_eq!(report.message, "LSO disabled on 2/2 adapter(s)");
        assert!(runner.called("Disable-NetAdapterLso -Name 'Ethernet'"));
        assert!(!runner.called("Disable-NetAdapterLso -Name 'Wi-Fi'"));
        let wifi = report.steps.iter().find(|s| s.name == "Wi-Fi").unwrap();
        assert_eq!(wifi.detail, "already disabled");
    }

    #[tokio::test]
    async fn test_adapter_still_enabled_fails_module() {
        let runner = runner(lso(true, true), lso(false, true));
        let (ctx, _dir) = test_context(runner, Config::default());

        let report = apply(&ctx).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.message, "LSO disabled on 1/2 adapter(s)");
        let wifi = report.steps.iter().find(|s| s.name == "Wi-Fi").unwrap();
        assert!(!wifi.success);
        assert!(wifi.detail.starts_with("still enabled"));
    }
}
