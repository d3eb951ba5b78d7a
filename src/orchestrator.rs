//! Module dispatch and the "run all" sequence.

use crate::error::{Result, TuneError};
use crate::modules::dns::DnsStatus;
use crate::modules::power::PowerStatus;
use crate::modules::tcp::TcpStatus;
use crate::modules::{dns, lso, mtu, power, repair, reset, ssl, tcp, tuning, ModuleContext, ModuleId};
use crate::report::{ModuleReport, RunSummary};

async fn dispatch_apply(ctx: &ModuleContext, id: ModuleId) -> Result<ModuleReport> {
    match id {
        ModuleId::Dns => dns::apply(ctx, ctx.config.dns.provider).await,
        ModuleId::Lso => lso::apply(ctx).await,
        ModuleId::Mtu => mtu::apply(ctx).await,
        ModuleId::Power => power::apply(ctx).await,
        ModuleId::Reset => reset::apply(ctx).await,
        ModuleId::Ssl => ssl::apply(ctx).await,
        ModuleId::Tuning => tuning::apply(ctx).await,
        ModuleId::Repair => repair::apply(ctx).await,
        ModuleId::Tcp => tcp::apply(ctx).await,
    }
}

async fn dispatch_revert(ctx: &ModuleContext, id: ModuleId) -> Result<ModuleReport> {
    match id {
        ModuleId::Dns => dns::revert(ctx).await,
        ModuleId::Lso => lso::revert(ctx).await,
        ModuleId::Mtu => mtu::revert(ctx).await,
        ModuleId::Power => power::revert(ctx).await,
        ModuleId::Tuning => tuning::revert(ctx).await,
        ModuleId::Tcp => tcp::revert(ctx).await,
        ModuleId::Reset | ModuleId::Ssl | ModuleId::Repair => {
            Err(TuneError::RevertUnsupported(id.title().to_string()))
        }
    }
}

fn finish(id: ModuleId, action: &str, result: Result<ModuleReport>) -> ModuleReport {
    let report = match result {
        Ok(report) => report,
        Err(e) => ModuleReport::new(id, false, e.to_string()),
    };
    if report.success {
        tracing::info!("{} {}: {}", action, id.key(), report.message);
    } else {
        tracing::error!("{} {} failed: {}", action, id.key(), report.message);
    }
    for step in &report.steps {
        tracing::debug!(
            "  {} [{}] {}",
            step.name,
            if step.success { "ok" } else { "failed" },
            step.detail
        );
    }
    report
}

/// Run one module. Errors become a failed report.
pub async fn run_module(ctx: &ModuleContext, id: ModuleId) -> ModuleReport {
    tracing::info!("Running {}", id.key());
    finish(id, "Run", dispatch_apply(ctx, id).await)
}

/// Restore a module's saved settings.
pub async fn revert_module(ctx: &ModuleContext, id: ModuleId) -> ModuleReport {
    tracing::info!("Reverting {}", id.key());
    finish(id, "Revert", dispatch_revert(ctx, id).await)
}

/// Run every module in `ModuleId::RUN_ALL_ORDER`. A failure never stops the
/// sequence. `on_report` sees each report as it completes.
pub async fn run_all<F>(ctx: &ModuleContext, mut on_report: F) -> RunSummary
where
    F: FnMut(&ModuleReport) + Send,
{
    let mut summary = RunSummary::default();
    for id in ModuleId::RUN_ALL_ORDER {
        let report = run_module(ctx, id).await;
        on_report(&report);
        summary.push(report);
    }

    if summary.all_succeeded() {
        tracing::info!("Run all: {}", summary.headline());
    } else if summary.mostly_succeeded() {
        tracing::warn!("Run all mostly succeeded: {}", summary.headline());
    } else {
        tracing::error!("Run all: {}", summary.headline());
    }
    summary
}

/// Per-adapter and TCP state for the status view.
#[derive(Debug, Clone, Default)]
pub struct SystemStatus {
    pub dns: Vec<DnsStatus>,
    pub power: Vec<PowerStatus>,
    pub tcp: Vec<TcpStatus>,
}

pub async fn collect_status(ctx: &ModuleContext) -> Result<SystemStatus> {
    let dns = dns::status(ctx).await?;
    let power = match power::status(ctx).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Power status unavailable: {}", e);
            Vec::new()
        }
    };
    let tcp = match tcp::status(ctx).await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("TCP status unavailable: {}", e);
            Vec::new()
        }
    };
    Ok(SystemStatus { dns, power, tcp })
}
