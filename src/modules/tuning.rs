//! System tuning: pause Windows Update, stop update services, close tray
//! applications, empty temp folders and widen the ephemeral port range.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TuneError};
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::registry::{RegValue, Registry};
use crate::system::{CommandRunner, CommandSpec};

const UPDATE_UX_KEY: &str = r"HKLM\SOFTWARE\Microsoft\WindowsUpdate\UX\Settings";
const TCP_PARAMS_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\Tcpip\Parameters";

/// Windows caps a pause at five weeks.
pub const MAX_PAUSE_DAYS: u32 = 35;

const PAUSE_START_VALUES: &[&str] = &[
    "PauseUpdatesStartTime",
    "PauseFeatureUpdatesStartTime",
    "PauseQualityUpdatesStartTime",
];
const PAUSE_END_VALUES: &[&str] = &[
    "PauseUpdatesExpiryTime",
    "PauseFeatureUpdatesEndTime",
    "PauseQualityUpdatesEndTime",
];

/// TCP/IP values written by the network step.
pub const NETWORK_VALUES: &[(&str, u32)] = &[
    ("TcpTimedWaitDelay", 30),
    ("MaxUserPort", 65534),
    ("DefaultTTL", 64),
];

const SERVICE_POLL_ATTEMPTS: u32 = 10;
const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pre-change values restored by revert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningBackup {
    pub pause: Vec<(String, Option<String>)>,
    pub network: Vec<(String, Option<u32>)>,
    pub running_services: Vec<String>,
}

/// Registry values that pause updates from `now` for `days` days.
pub fn pause_values(now: DateTime<Utc>, days: u32) -> Result<Vec<(&'static str, String)>> {
    if days == 0 || days > MAX_PAUSE_DAYS {
        return Err(TuneError::InvalidValue(format!(
            "pause of {} days outside 1-{}",
            days, MAX_PAUSE_DAYS
        )));
    }
    let fmt = "%Y-%m-%dT%H:%M:%SZ";
    let start = now.format(fmt).to_string();
    let end = (now + chrono::Duration::days(i64::from(days)))
        .format(fmt)
        .to_string();

    Ok(PAUSE_START_VALUES
        .iter()
        .map(|n| (*n, start.clone()))
        .chain(PAUSE_END_VALUES.iter().map(|n| (*n, end.clone())))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    Other(u32),
}

/// Read the `STATE : 4  RUNNING` line of `sc query`.
pub fn parse_service_state(output: &str) -> Option<ServiceState> {
    let line = output.lines().find(|l| l.trim_start().starts_with("STATE"))?;
    let code: u32 = line.split(':').nth(1)?.split_whitespace().next()?.parse().ok()?;
    Some(match code {
        1 => ServiceState::Stopped,
        2 => ServiceState::StartPending,
        3 => ServiceState::StopPending,
        4 => ServiceState::Running,
        other => ServiceState::Other(other),
    })
}

pub async fn service_state(runner: &dyn CommandRunner, service: &str) -> Result<Option<ServiceState>> {
    let output = runner
        .run(&CommandSpec::new("sc").args(["query", service]))
        .await?;
    Ok(parse_service_state(&output.stdout))
}

async fn wait_for_state(
    runner: &dyn CommandRunner,
    service: &str,
    wanted: ServiceState,
) -> Result<bool> {
    for attempt in 0..SERVICE_POLL_ATTEMPTS {
        if service_state(runner, service).await? == Some(wanted) {
            return Ok(true);
        }
        if attempt + 1 < SERVICE_POLL_ATTEMPTS {
            tokio::time::sleep(SERVICE_POLL_INTERVAL).await;
        }
    }
    Ok(false)
}

/// Image names (lower-cased) from `tasklist /FO CSV /NH`.
pub fn parse_tasklist(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|l| {
            let l = l.trim();
            let rest = l.strip_prefix('"')?;
            let end = rest.find('"')?;
            Some(rest[..end].to_ascii_lowercase())
        })
        .collect()
}

async fn running_images(runner: &dyn CommandRunner) -> Result<BTreeSet<String>> {
    let output = runner
        .run_checked(&CommandSpec::new("tasklist").args(["/FO", "CSV", "/NH"]))
        .await?;
    Ok(parse_tasklist(&output.stdout))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub removed: usize,
    pub skipped: usize,
}

/// Remove everything inside `dir`. Entries in use are skipped.
pub async fn clean_dir(dir: &Path) -> Result<CleanStats> {
    let mut stats = CleanStats::default();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => stats.removed += 1,
            Err(e) => {
                tracing::debug!("Skipped {}: {}", path.display(), e);
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

/// `%TEMP%`, `%TMP%` and `%SystemRoot%\Temp`, deduplicated.
pub fn temp_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let candidates = [
        std::env::var_os("TEMP").map(PathBuf::from),
        std::env::var_os("TMP").map(PathBuf::from),
        std::env::var_os("SystemRoot").map(|r| PathBuf::from(r).join("Temp")),
    ];
    for dir in candidates.into_iter().flatten() {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

async fn pause_updates(registry: &Registry<'_>, now: DateTime<Utc>, days: u32) -> StepOutcome {
    let name = "Pause Windows Update";
    let values = match pause_values(now, days) {
        Ok(v) => v,
        Err(e) => return StepOutcome::failed(name, e.to_string()),
    };
    for (value_name, data) in &values {
        if let Err(e) = registry
            .set_verified(UPDATE_UX_KEY, value_name, &RegValue::Sz(data.clone()))
            .await
        {
            tracing::warn!("Pausing updates failed at {}: {}", value_name, e);
            return StepOutcome::failed(name, e.to_string());
        }
    }
    let until = values
        .iter()
        .find(|(n, _)| *n == "PauseUpdatesExpiryTime")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    tracing::info!("Windows Update paused until {}", until);
    StepOutcome::ok(name, format!("paused until {}", until))
}

async fn stop_services(runner: &dyn CommandRunner, services: &[String]) -> (StepOutcome, Vec<String>) {
    let name = "Stop update services";
    let mut stopped = Vec::new();
    let mut failed = Vec::new();
    let mut was_running = Vec::new();

    for service in services {
        match service_state(runner, service).await {
            Ok(Some(ServiceState::Running)) | Ok(Some(ServiceState::StartPending)) => {}
            Ok(_) => continue,
            Err(e) => {
                failed.push(format!("{} ({})", service, e));
                continue;
            }
        }
        was_running.push(service.clone());

        let stop = runner
            .run(&CommandSpec::new("sc").args(["stop", service.as_str()]))
            .await;
        if let Err(e) = stop {
            failed.push(format!("{} ({})", service, e));
            continue;
        }
        match wait_for_state(runner, service, ServiceState::Stopped).await {
            Ok(true) => stopped.push(service.clone()),
            Ok(false) => failed.push(format!("{} (still running)", service)),
            Err(e) => failed.push(format!("{} ({})", service, e)),
        }
    }

    let outcome = if failed.is_empty() {
        StepOutcome::ok(name, format!("stopped {} service(s)", stopped.len()))
    } else {
        StepOutcome::failed(name, format!("could not stop: {}", failed.join(", ")))
    };
    (outcome, was_running)
}

async fn close_tray_apps(runner: &dyn CommandRunner, apps: &[String]) -> StepOutcome {
    let name = "Close tray applications";
    let running = match running_images(runner).await {
        Ok(r) => r,
        Err(e) => return StepOutcome::failed(name, e.to_string()),
    };
    let targets: Vec<String> = apps
        .iter()
        .map(|a| a.to_ascii_lowercase())
        .filter(|a| running.contains(a))
        .collect();
    if targets.is_empty() {
        return StepOutcome::ok(name, "none running");
    }

    for image in &targets {
        let spec = CommandSpec::new("taskkill").args(["/IM", image.as_str(), "/F"]);
        if let Err(e) = runner.run_checked(&spec).await {
            tracing::warn!("taskkill {} failed: {}", image, e);
        }
    }

    let still: Vec<String> = match running_images(runner).await {
        Ok(after) => targets.iter().filter(|t| after.contains(*t)).cloned().collect(),
        Err(e) => return StepOutcome::failed(name, format!("re-check failed: {}", e)),
    };
    if still.is_empty() {
        StepOutcome::ok(name, format!("closed {}", targets.join(", ")))
    } else {
        StepOutcome::failed(name, format!("still running: {}", still.join(", ")))
    }
}

async fn clean_temp(dirs: &[PathBuf]) -> StepOutcome {
    let name = "Clean temp folders";
    let mut total = CleanStats::default();
    let mut errors = Vec::new();
    for dir in dirs {
        match clean_dir(dir).await {
            Ok(stats) => {
                total.removed += stats.removed;
                total.skipped += stats.skipped;
            }
            Err(e) => errors.push(format!("{}: {}", dir.display(), e)),
        }
    }
    tracing::info!(
        "Temp cleanup removed {} item(s), skipped {} in use",
        total.removed,
        total.skipped
    );
    if errors.len() == dirs.len() && !dirs.is_empty() {
        StepOutcome::failed(name, errors.join("; "))
    } else {
        StepOutcome::ok(
            name,
            format!("removed {}, skipped {} in use", total.removed, total.skipped),
        )
    }
}

async fn apply_network_values(registry: &Registry<'_>) -> StepOutcome {
    let name = "TCP/IP port tuning";
    let mut failed = Vec::new();
    for (value_name, value) in NETWORK_VALUES {
        if let Err(e) = registry
            .set_verified(TCP_PARAMS_KEY, value_name, &RegValue::Dword(*value))
            .await
        {
            failed.push(format!("{} ({})", value_name, e));
        }
    }
    if failed.is_empty() {
        StepOutcome::ok(name, "TcpTimedWaitDelay=30 MaxUserPort=65534 DefaultTTL=64")
    } else {
        StepOutcome::failed(name, failed.join(", "))
    }
}

async fn snapshot(
    registry: &Registry<'_>,
    runner: &dyn CommandRunner,
    services: &[String],
) -> TuningBackup {
    let mut backup = TuningBackup::default();
    for name in PAUSE_START_VALUES.iter().chain(PAUSE_END_VALUES) {
        let current = registry
            .query(UPDATE_UX_KEY, name)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(String::from));
        backup.pause.push((name.to_string(), current));
    }
    for (name, _) in NETWORK_VALUES {
        let current = registry
            .query(TCP_PARAMS_KEY, name)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.as_dword());
        backup.network.push((name.to_string(), current));
    }
    for service in services {
        if let Ok(Some(ServiceState::Running)) = service_state(runner, service).await {
            backup.running_services.push(service.clone());
        }
    }
    backup
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    apply_at(ctx, Utc::now()).await
}

/// Only the update pause decides success; the other steps are reported.
async fn apply_at(ctx: &ModuleContext, now: DateTime<Utc>) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let registry = Registry::new(runner);
    let cfg = &ctx.config.tuning;

    let backup = snapshot(&registry, runner, &cfg.services).await;
    ctx.backups.save_best_effort(ModuleId::Tuning.key(), &backup);

    let mut steps = Vec::new();
    let pause = pause_updates(&registry, now, cfg.pause_days).await;
    let paused = pause.success;
    steps.push(pause);

    let (services_step, _) = stop_services(runner, &cfg.services).await;
    steps.push(services_step);
    steps.push(close_tray_apps(runner, &cfg.tray_apps).await);
    if cfg.clean_temp {
        steps.push(clean_temp(&temp_dirs()).await);
    }
    if cfg.network_tweaks {
        steps.push(apply_network_values(&registry).await);
    }

    let done = steps.iter().filter(|s| s.success).count();
    let message = if paused {
        format!(
            "Updates paused for {} day(s), {}/{} tuning steps succeeded",
            cfg.pause_days,
            done,
            steps.len()
        )
    } else {
        "Could not pause Windows Update".to_string()
    };
    Ok(ModuleReport::new(ModuleId::Tuning, paused, message).with_steps(steps))
}

pub async fn revert(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let registry = Registry::new(runner);
    let snapshot = ctx.backups.load::<TuningBackup>(ModuleId::Tuning.key())?;
    let backup = snapshot.data;
    let mut steps = Vec::new();

    let mut pause_errors = Vec::new();
    for (name, previous) in &backup.pause {
        let result = match previous {
            Some(v) => registry.set_verified(UPDATE_UX_KEY, name, &RegValue::Sz(v.clone())).await,
            None => registry.delete_verified(UPDATE_UX_KEY, name).await,
        };
        if let Err(e) = result {
            pause_errors.push(format!("{} ({})", name, e));
        }
    }
    let resumed = pause_errors.is_empty();
    steps.push(if resumed {
        StepOutcome::ok("Resume Windows Update", "pause settings restored")
    } else {
        StepOutcome::failed("Resume Windows Update", pause_errors.join(", "))
    });

    let mut net_errors = Vec::new();
    for (name, previous) in &backup.network {
        let result = match previous {
            Some(v) => registry.set_verified(TCP_PARAMS_KEY, name, &RegValue::Dword(*v)).await,
            None => registry.delete_verified(TCP_PARAMS_KEY, name).await,
        };
        if let Err(e) = result {
            net_errors.push(format!("{} ({})", name, e));
        }
    }
    steps.push(if net_errors.is_empty() {
        StepOutcome::ok("Restore TCP/IP values", "previous values restored")
    } else {
        StepOutcome::failed("Restore TCP/IP values", net_errors.join(", "))
    });

    let mut start_errors = Vec::new();
    for service in &backup.running_services {
        let _ = runner
            .run(&CommandSpec::new("sc").args(["start", service.as_str()]))
            .await;
        match wait_for_state(runner, service, ServiceState::Running).await {
            Ok(true) => {}
            Ok(false) => start_errors.push(format!("{} (not running)", service)),
            Err(e) => start_errors.push(format!("{} ({})", service, e)),
        }
    }
    steps.push(if start_errors.is_empty() {
        StepOutcome::ok(
            "Restart services",
            format!("{} service(s) running", backup.running_services.len()),
        )
    } else {
        StepOutcome::failed("Restart services", start_errors.join(", "))
    });

    let message = if resumed {
        "Windows Update resumed and tuning reverted".to_string()
    } else {
        "Could not resume Windows Update".to_string()
    };
    Ok(ModuleReport::new(ModuleId::Tuning, resumed, message).with_steps(steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::modules::test_context;
    use crate::system::command::fake::{fail, not_found, ok, ScriptedRunner};

    fn config() -> Config {
        let mut config = Config::default();
        config.tuning.pause_days = 7;
        config.tuning.services.clear();
        config.tuning.tray_apps = vec!["onedrive.exe".to_string()];
        config.tuning.clean_temp = false;
        config.tuning.network_tweaks = false;
        config
    }

    fn sz(name: &str, data: &str) -> crate::system::CommandOutput {
        ok(&format!(
            "\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\WindowsUpdate\\UX\\Settings\n    {}    REG_SZ    {}\n\n",
            name, data
        ))
    }

    #[test]
    fn test_pause_values_span() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let values = pause_values(now, 7).unwrap();
        assert_eq!(values.len(), 6);
        let expiry = values
            .iter()
            .find(|(n, _)| *n == "PauseUpdatesExpiryTime")
            .unwrap();
        assert_eq!(expiry.1, "2026-03-08T12:00:00Z");
        let start = values
            .iter()
            .find(|(n, _)| *n == "PauseQualityUpdatesStartTime")
            .unwrap();
        assert_eq!(start.1, "2026-03-01T12:00:00Z");
    }

    #[test]
    fn test_pause_days_bounds() {
        let now = Utc::now();
        assert!(pause_values(now, 0).is_err());
        assert!(pause_values(now, 36).is_err());
        assert!(pause_values(now, 35).is_ok());
    }

    #[test]
    fn test_parse_service_state() {
        let output = r#"
SERVICE_NAME: wuauserv
        TYPE               : 20  WIN32_SHARE_PROCESS
        STATE              : 4  RUNNING
                                (STOPPABLE, NOT_PAUSABLE, ACCEPTS_PRESHUTDOWN)
        WIN32_EXIT_CODE    : 0  (0x0)
"#;
        assert_eq!(parse_service_state(output), Some(ServiceState::Running));
        assert_eq!(
            parse_service_state("        STATE              : 1  STOPPED\n"),
            Some(ServiceState::Stopped)
        );
        assert_eq!(parse_service_state("[SC] OpenService FAILED 1060"), None);
    }

    #[test]
    fn test_parse_tasklist() {
        let output = r#""System Idle Process","0","Services","0","8 K"
"Steam.exe","4120","Console","1","95,312 K"
"OneDrive.exe","7788","Console","1","40,100 K"
"#;
        let images = parse_tasklist(output);
        assert!(images.contains("steam.exe"));
        assert!(images.contains("onedrive.exe"));
        assert!(!images.contains("dropbox.exe"));
    }

    #[tokio::test]
    async fn test_clean_dir_removes_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.tmp"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.tmp"), b"y").unwrap();

        let stats = clean_dir(dir.path()).await.unwrap();
        assert_eq!(stats.removed, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_pause_alone_decides_success() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut runner = ScriptedRunner::new();
        for (name, data) in pause_values(now, 7).unwrap() {
            runner = runner.on(&format!("reg query {} /v {}", UPDATE_UX_KEY, name), sz(name, &data));
        }
        let runner = Arc::new(runner.on("tasklist", fail(1, "ERROR: tasklist unavailable")));
        let (ctx, _dir) = test_context(runner.clone(), config());

        let report = apply_at(&ctx, now).await.unwrap();

        assert!(report.success, "{}", report.message);
        assert_eq!(
            report.message,
            "Updates paused for 7 day(s), 2/3 tuning steps succeeded"
        );
        assert_eq!(report.steps[0].detail, "paused until 2026-03-08T12:00:00Z");
        assert!(!report.steps[2].success);
    }

    #[tokio::test]
    async fn test_failed_pause_fails_module() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("reg add", fail(1, "ERROR: Access is denied."))
                .on("reg query", not_found())
                .on("tasklist", ok("\"explorer.exe\",\"4\",\"Console\",\"1\",\"9 K\"\n")),
        );
        let (ctx, _dir) = test_context(runner, config());

        let report = apply(&ctx).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.message, "Could not pause Windows Update");
        assert!(report.steps[1..].iter().all(|s| s.success));
    }

    #[tokio::test]
    async fn test_revert_removes_pause_and_restarts_services() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("reg query", not_found())
                .on("sc query wuauserv", ok("        STATE              : 4  RUNNING\n")),
        );
        let (ctx, _dir) = test_context(runner.clone(), config());
        let backup = TuningBackup {
            pause: PAUSE_START_VALUES
                .iter()
                .chain(PAUSE_END_VALUES)
                .map(|n| (n.to_string(), None))
                .collect(),
            network: Vec::new(),
            running_services: vec!["wuauserv".to_string()],
        };
        ctx.backups.save(ModuleId::Tuning.key(), &backup).unwrap();

        let report = revert(&ctx).await.unwrap();

        assert!(report.success, "{}", report.message);
        for name in PAUSE_START_VALUES.iter().chain(PAUSE_END_VALUES) {
            assert!(runner.called(&format!("reg delete {} /v {} /f", UPDATE_UX_KEY, name)));
        }
        assert!(runner.called("sc start wuauserv"));
        assert!(!runner.called("sc start bits"));
        assert!(report.steps[2].success, "{}", report.steps[2].detail);
    }
}
