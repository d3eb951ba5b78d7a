//! Interface MTU.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TuneError};
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::adapters::{list_subinterfaces, SubInterface};
use crate::system::{CommandRunner, CommandSpec};

pub const MIN_MTU: u32 = 576;
pub const MAX_MTU: u32 = 9000;

/// IPv4 header plus ICMP echo header; ping payload = MTU - 28.
pub const PING_OVERHEAD: u32 = 28;

/// Step between probe sizes.
pub const PROBE_STEP: u32 = 10;

/// Common MTU values and where they fit.
pub const KNOWN_VALUES: &[(u32, &str)] = &[
    (1500, "Ethernet default"),
    (1450, "Leaves room for PPPoE and most VPN headers"),
    (1400, "Safe for nested tunnels"),
    (1300, "Conservative, for lossy links"),
    (576, "IPv4 minimum"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtuCheck {
    pub mtu: u32,
    /// Description for known-good values, `None` for non-standard ones.
    pub note: Option<&'static str>,
}

impl MtuCheck {
    pub fn is_standard(&self) -> bool {
        self.note.is_some()
    }
}

/// Reject values outside 576..=9000.
pub fn validate(mtu: u32) -> Result<MtuCheck> {
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(TuneError::InvalidValue(format!(
            "MTU {} outside {}-{}",
            mtu, MIN_MTU, MAX_MTU
        )));
    }
    let note = KNOWN_VALUES
        .iter()
        .find(|(v, _)| *v == mtu)
        .map(|(_, note)| *note);
    Ok(MtuCheck { mtu, note })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuBackupEntry {
    pub interface: String,
    pub mtu: u32,
}

/// Send one don't-fragment ping carrying a packet of `mtu` bytes.
async fn ping_fits(runner: &dyn CommandRunner, host: &str, mtu: u32) -> Result<bool> {
    let payload = mtu.saturating_sub(PING_OVERHEAD);
    let spec = CommandSpec::new("ping")
        .args(["-n", "1", "-f", "-w", "1000", "-l"])
        .arg(payload.to_string())
        .arg(host)
        .timeout(Duration::from_secs(5));
    let output = runner.run(&spec).await?;
    Ok(output.success() && output.stdout.contains("TTL="))
}

/// Largest MTU in `min..=max` that reaches `host` unfragmented, searched
/// downward from `max`. `None` if even `min` does not get through.
pub async fn probe(runner: &dyn CommandRunner, host: &str, max: u32, min: u32) -> Result<Option<u32>> {
    if min > max {
        return Err(TuneError::InvalidValue(format!(
            "probe range {}-{} is empty",
            min, max
        )));
    }
    let mut mtu = max;
    loop {
        if ping_fits(runner, host, mtu).await? {
            tracing::info!("Path MTU to {} is {}", host, mtu);
            return Ok(Some(mtu));
        }
        tracing::debug!("MTU {} to {} needs fragmentation", mtu, host);
        if mtu <= min {
            break;
        }
        mtu = mtu.saturating_sub(PROBE_STEP).max(min);
    }
    tracing::warn!("No MTU between {} and {} reached {}", min, max, host);
    Ok(None)
}

async fn set_mtu(runner: &dyn CommandRunner, interface: &str, mtu: u32) -> Result<()> {
    let spec = CommandSpec::new("netsh")
        .args(["interface", "ipv4", "set", "subinterface"])
        .arg(interface)
        .arg(format!("mtu={}", mtu))
        .arg("store=persistent");
    runner.run_checked(&spec).await?;
    Ok(())
}

/// MTU to apply: probed when enabled, otherwise the configured target.
async fn resolve_target(ctx: &ModuleContext) -> Result<(u32, Option<StepOutcome>)> {
    let cfg = &ctx.config.mtu;
    if !cfg.auto_probe {
        return Ok((cfg.target, None));
    }
    match probe(ctx.runner(), &cfg.probe_host, cfg.probe_max, cfg.probe_min).await? {
        Some(mtu) => Ok((
            mtu,
            Some(StepOutcome::ok(
                "Probe path MTU",
                format!("{} reachable at {}", cfg.probe_host, mtu),
            )),
        )),
        None => Ok((
            cfg.target,
            Some(StepOutcome::failed(
                "Probe path MTU",
                format!("no reply from {}, using {}", cfg.probe_host, cfg.target),
            )),
        )),
    }
}

/// Apply `mtu` to the given interfaces and verify each by re-reading.
async fn apply_to(
    runner: &dyn CommandRunner,
    targets: &[(String, u32)],
) -> Result<Vec<StepOutcome>> {
    let mut steps = Vec::new();
    let mut written = Vec::new();

    for (name, mtu) in targets {
        match set_mtu(runner, name, *mtu).await {
            Ok(()) => written.push((name.clone(), *mtu)),
            Err(e) => {
                tracing::warn!("Setting MTU on {} failed: {}", name, e);
                steps.push(StepOutcome::failed(name, e.to_string()));
            }
        }
    }

    if written.is_empty() {
        return Ok(steps);
    }

    let after = list_subinterfaces(runner).await?;
    for (name, mtu) in written {
        let actual = after.iter().find(|s| s.name == name).map(|s| s.mtu);
        steps.push(match actual {
            Some(v) if v == mtu => {
                tracing::info!("MTU on {} verified at {}", name, mtu);
                StepOutcome::ok(&name, format!("MTU {}", mtu))
            }
            Some(v) => StepOutcome::failed(&name, format!("reads back {}, expected {}", v, mtu)),
            None => StepOutcome::failed(&name, "interface missing after change"),
        });
    }
    Ok(steps)
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let mut steps = Vec::new();

    let (target, probe_step) = resolve_target(ctx).await?;
    let check = validate(target)?;
    if !check.is_standard() {
        tracing::warn!("MTU {} is valid but non-standard", target);
    }

    let interfaces: Vec<SubInterface> = list_subinterfaces(runner)
        .await?
        .into_iter()
        .filter(|s| !s.is_loopback())
        .collect();

    let backup: Vec<MtuBackupEntry> = interfaces
        .iter()
        .map(|s| MtuBackupEntry {
            interface: s.name.clone(),
            mtu: s.mtu,
        })
        .collect();
    ctx.backups.save_best_effort(ModuleId::Mtu.key(), &backup);

    let connected: Vec<&SubInterface> = interfaces.iter().filter(|s| s.is_connected()).collect();
    if connected.is_empty() {
        steps.extend(probe_step);
        return Ok(
            ModuleReport::new(ModuleId::Mtu, false, "No connected interfaces found").with_steps(steps),
        );
    }

    let mut pending = Vec::new();
    for iface in &connected {
        if iface.mtu == target {
            steps.push(StepOutcome::ok(&iface.name, format!("already {}", target)));
        } else {
            pending.push((iface.name.clone(), target));
        }
    }
    steps.extend(apply_to(runner, &pending).await?);

    let verified = steps.iter().filter(|s| s.success).count();
    if let Some(step) = probe_step {
        steps.insert(0, step);
    }
    let message = format!(
        "MTU {} on {}/{} connected interface(s)",
        target,
        verified,
        connected.len()
    );
    Ok(ModuleReport::new(ModuleId::Mtu, verified > 0, message).with_steps(steps))
}

pub async fn revert(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let snapshot = ctx.backups.load::<Vec<MtuBackupEntry>>(ModuleId::Mtu.key())?;

    let current = list_subinterfaces(runner).await?;
    let mut steps = Vec::new();
    let mut pending = Vec::new();
    for entry in &snapshot.data {
        match current.iter().find(|s| s.name == entry.interface) {
            Some(s) if s.mtu == entry.mtu => {
                steps.push(StepOutcome::ok(&entry.interface, format!("already {}", entry.mtu)))
            }
            Some(_) => pending.push((entry.interface.clone(), entry.mtu)),
            None => steps.push(StepOutcome::failed(&entry.interface, "interface no longer present")),
        }
    }
    steps.extend(apply_to(runner, &pending).await?);

    let restored = steps.iter().filter(|s| s.success).count();
    let message = format!("MTU restored on {}/{} interface(s)", restored, snapshot.data.len());
    Ok(ModuleReport::new(ModuleId::Mtu, restored > 0, message).with_steps(steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::modules::test_context;
    use crate::system::command::fake::{fail, ok, ScriptedRunner};

    const HEADER: &str = "\n   MTU  MediaSenseState   Bytes In  Bytes Out  Interface\n\
------  ---------------  ---------  ---------  -------------\n";

    fn table(rows: &[(u32, u32, &str)]) -> String {
        let mut out = HEADER.to_string();
        for (mtu, state, name) in rows {
            out.push_str(&format!("{:>6}  {:>15}  {:>9}  {:>9}  {}\n", mtu, state, 0, 0, name));
        }
        out
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.mtu.auto_probe = false;
        config.mtu.target = 1450;
        config
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate(575).is_err());
        assert!(validate(9001).is_err());
        assert!(validate(576).unwrap().is_standard());
        assert!(validate(1450).unwrap().is_standard());
        let odd = validate(1492).unwrap();
        assert!(!odd.is_standard());
        assert!(validate(9000).is_ok());
    }

    #[tokio::test]
    async fn test_probe_finds_first_fitting_size() {
        // 1500 and 1490 fragment, 1480 fits
        let runner = ScriptedRunner::new()
            .on("-l 1472", fail(1, "Packet needs to be fragmented but DF set."))
            .on("-l 1462", fail(1, "Packet needs to be fragmented but DF set."))
            .on("-l 1452", ok("Reply from 8.8.8.8: bytes=1452 time=12ms TTL=117"));
        let mtu = probe(&runner, "8.8.8.8", 1500, 1300).await.unwrap();
        assert_eq!(mtu, Some(1480));
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_gives_up_at_minimum() {
        let runner = ScriptedRunner::new().on("ping", fail(1, "Request timed out."));
        let mtu = probe(&runner, "192.0.2.1", 1400, 1380).await.unwrap();
        assert_eq!(mtu, None);
        // 1400, 1390, 1380
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_rejects_inverted_range() {
        let runner = ScriptedRunner::new();
        assert!(probe(&runner, "8.8.8.8", 1300, 1500).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_skips_loopback_and_interfaces_already_at_target() {
        let before = table(&[
            (u32::MAX, 1, "Loopback Pseudo-Interface 1"),
            (1500, 1, "Ethernet"),
            (1450, 1, "vEthernet (Default Switch)"),
            (1500, 5, "Wi-Fi 2"),
        ]);
        let after = table(&[
            (u32::MAX, 1, "Loopback Pseudo-Interface 1"),
            (1450, 1, "Ethernet"),
            (1450, 1, "vEthernet (Default Switch)"),
            (1500, 5, "Wi-Fi 2"),
        ]);
        let runner = Arc::new(
            ScriptedRunner::new().on_seq("show subinterfaces", vec![ok(&before), ok(&after)]),
        );
        let (ctx, _dir) = test_context(runner.clone(), config());

        let report = apply(&ctx).await.unwrap();

        assert!(report.success, "{}", report.message);
        assert_eq!(report.message, "MTU 1450 on 2/2 connected interface(s)");
        assert!(runner.called("set subinterface Ethernet mtu=1450 store=persistent"));
        assert!(!runner.called("Loopback Pseudo-Interface 1\" mtu="));
        assert!(!runner.called("(Default Switch)\" mtu="));
        assert!(!runner.called("\"Wi-Fi 2\" mtu="));

        let backup = ctx
            .backups
            .load::<Vec<MtuBackupEntry>>(ModuleId::Mtu.key())
            .unwrap();
        assert_eq!(backup.data.len(), 3);
        assert!(backup.data.iter().all(|e| !e.interface.contains("Loopback")));
    }

    #[tokio::test]
    async fn test_apply_without_connected_interfaces_fails() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "show subinterfaces",
            ok(&table(&[
                (u32::MAX, 1, "Loopback Pseudo-Interface 1"),
                (1500, 5, "Wi-Fi 2"),
            ])),
        ));
        let (ctx, _dir) = test_context(runner.clone(), config());

        let report = apply(&ctx).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.message, "No connected interfaces found");
        assert!(!runner.called("set subinterface"));
    }

    #[tokio::test]
    async fn test_revert_restores_saved_values() {
        let current = table(&[(1450, 1, "Ethernet"), (1500, 5, "Wi-Fi 2")]);
        let after = table(&[(1500, 1, "Ethernet"), (1500, 5, "Wi-Fi 2")]);
        let runner = Arc::new(
            ScriptedRunner::new().on_seq("show subinterfaces", vec![ok(&current), ok(&after)]),
        );
        let (ctx, _dir) = test_context(runner.clone(), config());
        let saved = vec![
            MtuBackupEntry { interface: "Ethernet".into(), mtu: 1500 },
            MtuBackupEntry { interface: "Wi-Fi 2".into(), mtu: 1500 },
            MtuBackupEntry { interface: "Old VPN".into(), mtu: 1400 },
        ];
        ctx.backups.save(ModuleId::Mtu.key(), &saved).unwrap();

        let report = revert(&ctx).await.unwrap();

        assert!(report.success, "{}", report.message);
        assert_eq!(report.message, "MTU restored on 2/3 interface(s)");
        assert!(runner.called("set subinterface Ethernet mtu=1500"));
        assert!(!runner.called("\"Wi-Fi 2\" mtu="));
        let vpn = report.steps.iter().find(|s| s.name == "Old VPN").unwrap();
        assert!(!vpn.success);
    }
}
