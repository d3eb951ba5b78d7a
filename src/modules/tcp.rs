//! TCP retransmission and keep-alive timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::error::{Result, TuneError};
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::registry::{RegValue, Registry};

const TCP_PARAMS_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\Tcpip\Parameters";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A tunable DWORD and the range it accepts.
#[derive(Debug, Clone, Copy)]
pub struct TcpSetting {
    pub name: &'static str,
    pub min: u32,
    pub max: u32,
}

pub const MAX_DATA_RETRANSMISSIONS: TcpSetting = TcpSetting {
    name: "TcpMaxDataRetransmissions",
    min: 1,
    max: 255,
};

pub const KEEP_ALIVE_TIME: TcpSetting = TcpSetting {
    name: "KeepAliveTime",
    min: 60_000,
    max: u32::MAX,
};

impl TcpSetting {
    pub fn validate(&self, value: u32) -> Result<u32> {
        if value < self.min || value > self.max {
            return Err(TuneError::InvalidValue(format!(
                "{}={} outside {}-{}",
                self.name, value, self.min, self.max
            )));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    Configured,
    NeedsUpdate(u32),
    NotFound,
}

impl ValueState {
    pub fn label(self) -> String {
        match self {
            ValueState::Configured => "configured".to_string(),
            ValueState::NeedsUpdate(v) => format!("needs update (currently {})", v),
            ValueState::NotFound => "not found".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpStatus {
    pub name: &'static str,
    pub wanted: u32,
    pub state: ValueState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpBackupEntry {
    pub name: String,
    pub previous: Option<u32>,
}

/// Settings with the values the config asks for.
fn targets(ctx: &ModuleContext) -> [(TcpSetting, u32); 2] {
    [
        (MAX_DATA_RETRANSMISSIONS, ctx.config.tcp.max_data_retransmissions),
        (KEEP_ALIVE_TIME, ctx.config.tcp.keep_alive_time),
    ]
}

async fn read_value(registry: &Registry<'_>, name: &str) -> Result<Option<u32>> {
    Ok(registry
        .query(TCP_PARAMS_KEY, name)
        .await?
        .and_then(|v| v.as_dword()))
}

pub async fn status(ctx: &ModuleContext) -> Result<Vec<TcpStatus>> {
    let registry = Registry::new(ctx.runner());
    let mut result = Vec::new();
    for (setting, wanted) in targets(ctx) {
        let state = match read_value(&registry, setting.name).await? {
            Some(v) if v == wanted => ValueState::Configured,
            Some(v) => ValueState::NeedsUpdate(v),
            None => ValueState::NotFound,
        };
        result.push(TcpStatus {
            name: setting.name,
            wanted,
            state,
        });
    }
    Ok(result)
}

/// Open a TCP connection to confirm the stack still reaches the outside.
pub async fn connectivity_check(host: &str, port: u16) -> StepOutcome {
    let name = "Connectivity check";
    let addr = format!("{}:{}", host, port);
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => {
            tracing::info!("Connected to {}", addr);
            StepOutcome::ok(name, format!("connected to {}", addr))
        }
        Ok(Err(e)) => {
            tracing::warn!("Connectivity check to {} failed: {}", addr, e);
            StepOutcome::failed(name, e.to_string())
        }
        Err(_) => {
            tracing::warn!("Connectivity check to {} timed out", addr);
            StepOutcome::failed(name, format!("no answer from {} in 10s", addr))
        }
    }
}

pub async fn apply(ctx: &ModuleContext) -> Result<ModuleReport> {
    let registry = Registry::new(ctx.runner());
    let targets = targets(ctx);
    for (setting, value) in &targets {
        setting.validate(*value)?;
    }

    let mut backup = Vec::new();
    for (setting, _) in &targets {
        backup.push(TcpBackupEntry {
            name: setting.name.to_string(),
            previous: read_value(&registry, setting.name).await.unwrap_or(None),
        });
    }
    ctx.backups.save_best_effort(ModuleId::Tcp.key(), &backup);

    let mut steps = Vec::new();
    for (setting, value) in &targets {
        let result = registry
            .set_verified(TCP_PARAMS_KEY, setting.name, &RegValue::Dword(*value))
            .await;
        steps.push(match result {
            Ok(()) => {
                tracing::info!("{} set to {}", setting.name, value);
                StepOutcome::ok(setting.name, value.to_string())
            }
            Err(e) => {
                tracing::warn!("Setting {} failed: {}", setting.name, e);
                StepOutcome::failed(setting.name, e.to_string())
            }
        });
    }
    let verified = steps.iter().filter(|s| s.success).count();

    // Informational only.
    let tcp = &ctx.config.tcp;
    steps.push(connectivity_check(&tcp.check_host, tcp.check_port).await);

    let message = format!("{}/{} TCP values verified", verified, targets.len());
    Ok(ModuleReport::new(ModuleId::Tcp, verified > 0, message).with_steps(steps))
}

pub async fn revert(ctx: &ModuleContext) -> Result<ModuleReport> {
    let registry = Registry::new(ctx.runner());
    let snapshot = ctx.backups.load::<Vec<TcpBackupEntry>>(ModuleId::Tcp.key())?;

    let mut steps = Vec::new();
    for entry in &snapshot.data {
        let result = match entry.previous {
            Some(v) => {
                registry
                    .set_verified(TCP_PARAMS_KEY, &entry.name, &RegValue::Dword(v))
                    .await
            }
            None => registry.delete_verified(TCP_PARAMS_KEY, &entry.name).await,
        };
        let detail = entry
            .previous
            .map(|v| v.to_string())
            .unwrap_or_else(|| "removed".to_string());
        steps.push(match result {
            Ok(()) => StepOutcome::ok(&entry.name, detail),
            Err(e) => StepOutcome::failed(&entry.name, e.to_string()),
        });
    }

    let done = steps.iter().filter(|s| s.success).count();
    let message = format!("{}/{} TCP values restored", done, snapshot.data.len());
    Ok(ModuleReport::new(ModuleId::Tcp, done > 0, message).with_steps(steps))
}
