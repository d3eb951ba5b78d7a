//! Adapter power management.
//!
//! Windows keeps per-adapter driver settings under the network class key.
//! `PnPCapabilities` with bit 0x10 set removes "Allow the computer to turn
//! off this device to save power".

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::adapters::{require_adapters, Adapter};
use crate::system::registry::{RegValue, Registry};
use crate::system::CommandRunner;

const CLASS_KEY: &str =
    r"HKLM\SYSTEM\CurrentControlSet\Control\Class\{4d36e972-e325-11ce-bfc1-08002be10318}";
const PNP_VALUE: &str = "PnPCapabilities";

/// 0x18: power management disabled, wake settings hidden.
pub const POWER_SAVING_OFF: u32 = 24;
const POWER_OFF_BIT: u32 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Windows may power the adapter down.
    Enabled,
    /// Power management turned off.
    Disabled,
    /// No `PnPCapabilities` value; driver default (power saving allowed).
    NotConfigured,
    /// Driver key could not be located.
    Unknown,
}

impl PowerState {
    pub fn from_value(value: Option<u32>) -> Self {
        match value {
            None => PowerState::NotConfigured,
            Some(v) if v & POWER_OFF_BIT != 0 => PowerState::Disabled,
            Some(_) => PowerState::Enabled,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PowerState::Enabled => "power saving on",
            PowerState::Disabled => "power saving off",
            PowerState::NotConfigured => "default (power saving on)",
            PowerState::Unknown => "driver key not found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerStatus {
    pub adapter: String,
    pub key: Option<String>,
    pub state: PowerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerBackupEntry {
    pub adapter: String,
    pub key: String,
    pub previous: Option<u32>,
}

/// Pair each adapter with its driver key under the network class.
async fn locate_driver_keys(
    runner: &dyn CommandRunner,
    adapters: &[Adapter],
) -> Result<Vec<(Adapter, Option<String>)>> {
    let registry = Registry::new(runner);
    let matches = registry.search(CLASS_KEY, "NetCfgInstanceId").await?;

    Ok(adapters
        .iter()
        .map(|adapter| {
            let key = matches
                .iter()
                .find(|m| {
                    m.value
                        .as_str()
                        .is_some_and(|id| id.eq_ignore_ascii_case(&adapter.guid))
                })
                .map(|m| m.key.clone());
            if key.is_none() {
                tracing::warn!("No driver key for adapter {} ({})", adapter.name, adapter.guid);
            }
            (adapter.clone(), key)
        })
        .collect())
}

async fn read_value(registry: &Registry<'_>, key: &str) -> Result<Option<u32>> {
    Ok(registry
        .query(key, PNP_VALUE)
        .await?
        .and_then(|v| v.as_dword()))
}

pub async fn status(ctx: &ModuleContext) -> Result<Vec<PowerStatus>> {
    let runner = ctx.runner();
    let adapters = require_adapters(runner).await?;
    let registry = Registry::new(runner);

    let mut result = Vec::new();
    for (adapter, key) in locate_driver_keys(runner, &adapters).await? {
        let state = match &key {
            Some(k) => match read_value(&registry, k).await {
                Ok(v) => PowerState::from_value(v),
                Err(_) => PowerState::Unknown,
            },
            None => PowerState::Unknown,
        };
        result.push(PowerStatus {
            adapter: adapter.name,
            key,
            state,
        });
    }
    Ok(result)
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let adapters = require_adapters(runner).await?;
    let located = locate_driver_keys(runner, &adapters).await?;
    let registry = Registry::new(runner);

    let mut backup = Vec::new();
    for (adapter, key) in &located {
        if let Some(key) = key {
            backup.push(PowerBackupEntry {
                adapter: adapter.name.clone(),
                key: key.clone(),
                previous: read_value(&registry, key).await.unwrap_or(None),
            });
        }
    }
    ctx.backups.save_best_effort(ModuleId::Power.key(), &backup);

    let mut steps = Vec::new();
    for (adapter, key) in &located {
        let Some(key) = key else {
            steps.push(StepOutcome::failed(&adapter.name, "driver key not found"));
            continue;
        };
        let result = registry
            .set_verified(key, PNP_VALUE, &RegValue::Dword(POWER_SAVING_OFF))
            .await;
        steps.push(match result {
            Ok(()) => {
                tracing::info!("Power saving disabled on {}", adapter.name);
                StepOutcome::ok(&adapter.name, "power saving off")
            }
            Err(e) => {
                tracing::warn!("Power setting failed on {}: {}", adapter.name, e);
                StepOutcome::failed(&adapter.name, e.to_string())
            }
        });
    }

    let done = steps.iter().filter(|s| s.success).count();
    let message = format!(
        "Power saving disabled on {}/{} adapter(s), restart to apply",
        done,
        located.len()
    );
    Ok(ModuleReport::new(ModuleId::Power, done > 0, message)
        .with_steps(steps)
        .with_reboot(done > 0))
}

/// Restore the saved values, or remove the override when no backup exists.
pub async fn revert(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let registry = Registry::new(runner);

    let entries = match ctx.backups.load::<Vec<PowerBackupEntry>>(ModuleId::Power.key()) {
        Ok(snapshot) => snapshot.data,
        Err(e) => {
            tracing::info!("No power backup ({}), removing overrides instead", e);
            let adapters = require_adapters(runner).await?;
            locate_driver_keys(runner, &adapters)
                .await?
                .into_iter()
                .filter_map(|(adapter, key)| {
                    key.map(|key| PowerBackupEntry {
                        adapter: adapter.name,
                        key,
                        previous: None,
                    })
                })
                .collect()
        }
    };

    let mut steps = Vec::new();
    for entry in &entries {
        let result = match entry.previous {
            Some(v) => registry
                .set_verified(&entry.key, PNP_VALUE, &RegValue::Dword(v))
                .await,
            None => registry.delete_verified(&entry.key, PNP_VALUE).await,
        };
        steps.push(match result {
            Ok(()) => StepOutcome::ok(&entry.adapter, PowerState::from_value(entry.previous).label()),
            Err(e) => StepOutcome::failed(&entry.adapter, e.to_string()),
        });
    }

    let done = steps.iter().filter(|s| s.success).count();
    let message = format!("Power settings restored on {}/{} adapter(s)", done, entries.len());
    Ok(ModuleReport::new(ModuleId::Power, done > 0, message)
        .with_steps(steps)
        .with_reboot(done > 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_from_value() {
        assert_eq!(PowerState::from_value(None), PowerState::NotConfigured);
        assert_eq!(PowerState::from_value(Some(24)), PowerState::Disabled);
        assert_eq!(PowerState::from_value(Some(0)), PowerState::Enabled);
        assert_eq!(PowerState::from_value(Some(8)), PowerState::Enabled);
    }
}
