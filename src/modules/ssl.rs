//! SSL/TLS certificate cache cleanup.

use crate::error::Result;
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::{CommandRunner, CommandSpec};

/// Current-user certificate stores this module may empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStore {
    /// Intermediate certification authorities.
    Intermediate,
    /// Personal certificates.
    Personal,
}

impl CertStore {
    fn store_name(self) -> &'static str {
        match self {
            CertStore::Intermediate => "CA",
            CertStore::Personal => "My",
        }
    }

    fn label(self) -> &'static str {
        match self {
            CertStore::Intermediate => "Clear intermediate CA store",
            CertStore::Personal => "Clear personal store",
        }
    }
}

/// Number of certificates in a `certutil -store` listing.
pub fn count_certificates(output: &str) -> usize {
    output
        .lines()
        .filter(|l| {
            let t = l.trim();
            t.starts_with('=') && t.contains(" Certificate ")
        })
        .count()
}

pub async fn store_count(runner: &dyn CommandRunner, store: CertStore) -> Result<usize> {
    let spec = CommandSpec::new("certutil").args(["-user", "-store", store.store_name()]);
    let output = runner.run_checked(&spec).await?;
    Ok(count_certificates(&output.stdout))
}

async fn run_step(runner: &dyn CommandRunner, name: &str, spec: CommandSpec) -> StepOutcome {
    match runner.run_checked(&spec).await {
        Ok(_) => StepOutcome::ok(name, spec.display()),
        Err(e) => {
            tracing::warn!("{} failed: {}", name, e);
            StepOutcome::failed(name, e.to_string())
        }
    }
}

/// Empty a user store and confirm by counting again. Certificates the user
/// cannot remove (inherited from the machine store) may remain; the step
/// passes when the store is empty or shrank.
async fn clear_store(runner: &dyn CommandRunner, store: CertStore) -> StepOutcome {
    let name = store.label();
    let before = match store_count(runner, store).await {
        Ok(n) => n,
        Err(e) => return StepOutcome::failed(name, format!("listing failed: {}", e)),
    };
    if before == 0 {
        return StepOutcome::ok(name, "already empty");
    }

    let script = format!(
        "$s = New-Object System.Security.Cryptography.X509Certificates.X509Store('{}','CurrentUser'); \
         $s.Open('ReadWrite'); $s.RemoveRange($s.Certificates); $s.Close()",
        store.store_name()
    );
    if let Err(e) = runner.run_checked(&CommandSpec::powershell(script)).await {
        return StepOutcome::failed(name, e.to_string());
    }

    match store_count(runner, store).await {
        Ok(0) => {
            tracing::info!("Removed {} certificate(s) from {}", before, store.store_name());
            StepOutcome::ok(name, format!("removed {}", before))
        }
        Ok(after) if after < before => StepOutcome::ok(
            name,
            format!("removed {}, {} inherited remain", before - after, after),
        ),
        Ok(after) => StepOutcome::failed(name, format!("{} certificate(s) remain", after)),
        Err(e) => StepOutcome::failed(name, format!("re-count failed: {}", e)),
    }
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let mut steps = Vec::new();

    steps.push(
        run_step(
            runner,
            "Clear URL cache",
            CommandSpec::new("certutil").args(["-urlcache", "*", "delete"]),
        )
        .await,
    );
    steps.push(
        run_step(
            runner,
            "Resync chain engine",
            CommandSpec::new("certutil").args(["-setreg", r"chain\ChainCacheResyncFiletime", "@now"]),
        )
        .await,
    );
    steps.push(clear_store(runner, CertStore::Intermediate).await);
    if ctx.config.ssl.clear_personal_store {
        steps.push(clear_store(runner, CertStore::Personal).await);
    }

    let done = steps.iter().filter(|s| s.success).count();
    let success = done == steps.len();
    let message = if success {
        "SSL/TLS caches cleared".to_string()
    } else {
        format!("{}/{} SSL cleanup steps succeeded", done, steps.len())
    };
    Ok(ModuleReport::new(ModuleId::Ssl, success, message).with_steps(steps))
}
