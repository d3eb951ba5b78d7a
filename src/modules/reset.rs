//! Network stack reset.

use std::time::Duration;

use crate::error::Result;
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::{CommandRunner, CommandSpec};

/// A reset step: label, program, arguments.
struct ResetStep {
    name: &'static str,
    program: &'static str,
    args: &'static [&'static str],
    timeout: Duration,
}

const STEPS: &[ResetStep] = &[
    ResetStep {
        name: "Release IP leases",
        program: "ipconfig",
        args: &["/release"],
        timeout: Duration::from_secs(60),
    },
    ResetStep {
        name: "Reset Winsock catalog",
        program: "netsh",
        args: &["winsock", "reset"],
        timeout: Duration::from_secs(60),
    },
    ResetStep {
        name: "Reset TCP/IP stack",
        program: "netsh",
        args: &["int", "ip", "reset"],
        timeout: Duration::from_secs(60),
    },
    ResetStep {
        name: "Renew IP leases",
        program: "ipconfig",
        args: &["/renew"],
        timeout: Duration::from_secs(120),
    },
    ResetStep {
        name: "Flush DNS cache",
        program: "ipconfig",
        args: &["/flushdns"],
        timeout: Duration::from_secs(30),
    },
];

/// Entries in the resolver cache, from `ipconfig /displaydns`.
pub async fn dns_cache_size(runner: &dyn CommandRunner) -> Result<usize> {
    let spec = CommandSpec::new("ipconfig").arg("/displaydns");
    let output = runner.run(&spec).await?;
    Ok(count_cache_records(&output.stdout))
}

pub fn count_cache_records(output: &str) -> usize {
    output
        .lines()
        .filter(|l| l.trim_start().starts_with("Record Name"))
        .count()
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();

    match dns_cache_size(runner).await {
        Ok(n) => tracing::info!("DNS cache holds {} record(s) before reset", n),
        Err(e) => tracing::debug!("Could not read DNS cache: {}", e),
    }

    let mut steps = Vec::with_capacity(STEPS.len());
    for step in STEPS {
        let spec = CommandSpec::new(step.program)
            .args(step.args.iter().copied())
            .timeout(step.timeout);
        tracing::info!("Reset step: {}", step.name);
        steps.push(match runner.run_checked(&spec).await {
            Ok(_) => StepOutcome::ok(step.name, spec.display()),
            Err(e) => {
                tracing::warn!("{} failed: {}", step.name, e);
                StepOutcome::failed(step.name, e.to_string())
            }
        });
    }

    match dns_cache_size(runner).await {
        Ok(n) => tracing::info!("DNS cache holds {} record(s) after reset", n),
        Err(e) => tracing::debug!("Could not read DNS cache: {}", e),
    }

    let done = steps.iter().filter(|s| s.success).count();
    let success = done == steps.len();
    let message = if success {
        "Network stack reset, restart to finish".to_string()
    } else {
        format!("{}/{} reset steps succeeded", done, steps.len())
    };
    Ok(ModuleReport::new(ModuleId::Reset, success, message)
        .with_steps(steps)
        .with_reboot(done > 0))
}
