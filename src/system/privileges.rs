//! Administrator check.

use crate::system::{CommandRunner, CommandSpec};

/// `net session` only succeeds in an elevated process.
pub async fn is_elevated(runner: &dyn CommandRunner) -> bool {
    match runner.run(&CommandSpec::new("net").arg("session")).await {
        Ok(output) => output.success(),
        Err(e) => {
            tracing::debug!("Elevation check failed: {}", e);
            false
        }
    }
}
