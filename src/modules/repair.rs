//! Disk and system file repair.

use std::time::Duration;

use crate::error::{Result, TuneError};
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::{CommandOutput, CommandRunner, CommandSpec};

const HOUR: Duration = Duration::from_secs(60 * 60);

/// CHKDSK's confirmation once the check is queued for the next boot. The
/// Y/N prompt before it mentions the next restart too, so only this exact
/// sentence counts.
const CHKDSK_SCHEDULED: &str = "this volume will be checked the next time the system restarts";

/// Whether CHKDSK output reports a check queued for the next restart.
pub fn chkdsk_scheduled(output: &str) -> bool {
    // The console wraps long lines, so compare with whitespace collapsed.
    let flat = output
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    flat.contains(CHKDSK_SCHEDULED)
}

/// SFC found nothing or repaired what it found.
pub fn sfc_clean(output: &str) -> bool {
    output.contains("did not find any integrity violations")
        || output.contains("successfully repaired")
}

fn chkdsk_spec(drive: &str) -> CommandSpec {
    CommandSpec::new("chkdsk")
        .args([drive, "/F", "/R"])
        .stdin("Y\n")
        .timeout(HOUR)
}

fn cleanup_spec(reset_base: bool) -> CommandSpec {
    let spec = CommandSpec::new("DISM")
        .args(["/Online", "/Cleanup-Image", "/StartComponentCleanup"])
        .timeout(HOUR);
    if reset_base {
        spec.arg("/ResetBase")
    } else {
        spec
    }
}

fn summarize(output: &CommandOutput) -> String {
    output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("completed")
        .to_string()
}

async fn run_chkdsk(runner: &dyn CommandRunner, drive: &str) -> StepOutcome {
    let name = "Check disk";
    let spec = chkdsk_spec(drive);
    match runner.run(&spec).await {
        Ok(output) if output.success() => StepOutcome::ok(name, summarize(&output)),
        Ok(output) if chkdsk_scheduled(&output.combined()) => {
            tracing::info!("CHKDSK on {} scheduled for next restart", drive);
            StepOutcome::ok(name, format!("{} will be checked at next restart", drive))
        }
        Ok(output) => match output.checked(&spec) {
            Ok(_) => StepOutcome::ok(name, "completed"),
            Err(e) => StepOutcome::failed(name, e.to_string()),
        },
        Err(e) => StepOutcome::failed(name, e.to_string()),
    }
}

async fn run_sfc(runner: &dyn CommandRunner) -> StepOutcome {
    let name = "System file check";
    let spec = CommandSpec::new("sfc").arg("/scannow").timeout(HOUR);
    match runner.run(&spec).await {
        Ok(output) if output.success() || sfc_clean(&output.stdout) => {
            StepOutcome::ok(name, summarize(&output))
        }
        Ok(output) => match output.checked(&spec) {
            Ok(_) => StepOutcome::ok(name, "completed"),
            Err(e) => StepOutcome::failed(name, e.to_string()),
        },
        Err(e) => StepOutcome::failed(name, e.to_string()),
    }
}

async fn run_dism(runner: &dyn CommandRunner, name: &str, spec: CommandSpec) -> StepOutcome {
    match runner.run_checked(&spec).await {
        Ok(output) => StepOutcome::ok(name, summarize(&output)),
        Err(TuneError::Timeout { seconds, .. }) => {
            StepOutcome::failed(name, format!("gave up after {} minutes", seconds / 60))
        }
        Err(e) => StepOutcome::failed(name, e.to_string()),
    }
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let cfg = &ctx.config.repair;
    let mut steps = Vec::new();

    tracing::info!("Repair: chkdsk {}", cfg.drive);
    steps.push(run_chkdsk(runner, &cfg.drive).await);

    tracing::info!("Repair: sfc /scannow");
    steps.push(run_sfc(runner).await);

    tracing::info!("Repair: DISM RestoreHealth");
    steps.push(
        run_dism(
            runner,
            "Restore component store",
            CommandSpec::new("DISM")
                .args(["/Online", "/Cleanup-Image", "/RestoreHealth"])
                .timeout(HOUR * 2),
        )
        .await,
    );

    tracing::info!("Repair: DISM StartComponentCleanup");
    steps.push(run_dism(runner, "Clean up components", cleanup_spec(cfg.reset_base)).await);

    for step in steps.iter().filter(|s| !s.success) {
        tracing::warn!("{} failed: {}", step.name, step.detail);
    }

    let done = steps.iter().filter(|s| s.success).count();
    let success = done == steps.len();
    let message = if success {
        "Repair tools finished, restart to complete".to_string()
    } else {
        format!("{}/{} repair steps succeeded", done, steps.len())
    };
    Ok(ModuleReport::new(ModuleId::Repair, success, message)
        .with_steps(steps)
        .with_reboot(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chkdsk_scheduled_detection() {
        let output = "Chkdsk cannot run because the volume is in use by another\n\
                      process.  Would you like to schedule this volume to be\n\
                      checked the next time the system restarts? (Y/N) Y\n\
                      This volume will be checked the next time the system restarts.";
        assert!(chkdsk_scheduled(output));
        assert!(!chkdsk_scheduled("Windows has scanned the file system and found no problems."));
    }

    #[test]
    fn test_chkdsk_prompt_alone_is_not_scheduled() {
        let output = "Chkdsk cannot run because the volume is in use by another process.\n\
                      Would you like to schedule this volume to be checked the next time\n\
                      the system restarts? (Y/N)\n\
                      The volume could not be scheduled for checking.";
        assert!(!chkdsk_scheduled(output));
    }

    #[test]
    fn test_sfc_clean() {
        assert!(sfc_clean(
            "Windows Resource Protection did not find any integrity violations."
        ));
        assert!(sfc_clean(
            "Windows Resource Protection found corrupt files and successfully repaired them."
        ));
        assert!(!sfc_clean(
            "Windows Resource Protection found corrupt files but was unable to fix some of them."
        ));
    }

    #[test]
    fn test_cleanup_reset_base_flag() {
        assert!(cleanup_spec(true).display().ends_with("/ResetBase"));
        assert!(!cleanup_spec(false).display().contains("/ResetBase"));
    }

    #[tokio::test]
    async fn test_scheduled_chkdsk_counts_as_success() {
        use crate::system::command::fake::{fail, ScriptedRunner};

        let runner = ScriptedRunner::new().on(
            "chkdsk",
            fail(3, "This volume will be checked the next time the system restarts."),
        );
        let step = run_chkdsk(&runner, "C:").await;
        assert!(step.success);
    }

    #[tokio::test]
    async fn test_unscheduled_chkdsk_fails() {
        use crate::system::command::fake::{fail, ScriptedRunner};

        let runner = ScriptedRunner::new().on(
            "chkdsk",
            fail(
                3,
                "Would you like to schedule this volume to be checked the next time the system restarts? (Y/N) \n\
                 The volume could not be scheduled for checking.",
            ),
        );
        let step = run_chkdsk(&runner, "C:").await;
        assert!(!step.success);
        assert!(!step.detail.contains("next restart"));
    }
}
