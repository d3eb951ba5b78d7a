//! DNS server configuration.
//!
//! Servers are written with netsh (by interface index) and verified by
//! reading `NameServer` from the adapter's Tcpip interface key.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::modules::{ModuleContext, ModuleId};
use crate::report::{ModuleReport, StepOutcome};
use crate::system::adapters::{require_adapters, Adapter};
use crate::system::registry::{RegValue, Registry};
use crate::system::{CommandRunner, CommandSpec};

const INTERFACES_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\Tcpip\Parameters\Interfaces";

/// Known public resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsProvider {
    #[default]
    Cloudflare,
    Google,
    OpenDns,
    Quad9,
    /// Servers handed out by DHCP.
    Automatic,
}

impl DnsProvider {
    pub const ALL: [DnsProvider; 5] = [
        DnsProvider::Cloudflare,
        DnsProvider::Google,
        DnsProvider::OpenDns,
        DnsProvider::Quad9,
        DnsProvider::Automatic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DnsProvider::Cloudflare => "Cloudflare",
            DnsProvider::Google => "Google",
            DnsProvider::OpenDns => "OpenDNS",
            DnsProvider::Quad9 => "Quad9",
            DnsProvider::Automatic => "Automatic (DHCP)",
        }
    }

    /// Primary then secondary. Empty for DHCP.
    pub fn servers(self) -> &'static [&'static str] {
        match self {
            DnsProvider::Cloudflare => &["1.1.1.1", "1.0.0.1"],
            DnsProvider::Google => &["8.8.8.8", "8.8.4.4"],
            DnsProvider::OpenDns => &["208.67.222.222", "208.67.220.220"],
            DnsProvider::Quad9 => &["9.9.9.9", "149.112.112.112"],
            DnsProvider::Automatic => &[],
        }
    }

    /// Which provider a server list belongs to, if any.
    pub fn identify(servers: &[String]) -> Option<DnsProvider> {
        Self::ALL
            .into_iter()
            .find(|p| p.servers().iter().copied().eq(servers.iter().map(String::as_str)))
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Pre-change servers for one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsBackupEntry {
    pub adapter: String,
    pub index: u32,
    pub guid: String,
    /// Statically configured servers; empty means DHCP.
    pub servers: Vec<String>,
}

/// Current DNS configuration of an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsStatus {
    pub adapter: String,
    pub servers: Vec<String>,
}

impl DnsStatus {
    pub fn label(&self) -> String {
        match DnsProvider::identify(&self.servers) {
            Some(p) => p.name().to_string(),
            None => format!("Custom ({})", self.servers.join(", ")),
        }
    }
}

fn interface_key(guid: &str) -> String {
    format!(r"{}\{}", INTERFACES_KEY, guid)
}

/// `NameServer` may be comma or space separated.
pub fn parse_server_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Statically configured servers of an adapter (empty = DHCP).
pub async fn read_servers(runner: &dyn CommandRunner, guid: &str) -> Result<Vec<String>> {
    let registry = Registry::new(runner);
    let value = registry.query(&interface_key(guid), "NameServer").await?;
    Ok(match value {
        Some(RegValue::Sz(s)) => parse_server_list(&s),
        _ => Vec::new(),
    })
}

/// Point an interface at `servers`, or at DHCP when empty.
pub async fn write_servers(runner: &dyn CommandRunner, index: u32, servers: &[String]) -> Result<()> {
    let name = format!("name={}", index);

    let Some((primary, rest)) = servers.split_first() else {
        let spec = CommandSpec::new("netsh").args([
            "interface",
            "ipv4",
            "set",
            "dnsservers",
            name.as_str(),
            "source=dhcp",
        ]);
        runner.run_checked(&spec).await?;
        return Ok(());
    };

    let spec = CommandSpec::new("netsh").args([
        "interface".to_string(),
        "ipv4".to_string(),
        "set".to_string(),
        "dnsservers".to_string(),
        name.clone(),
        "source=static".to_string(),
        format!("address={}", primary),
        "register=primary".to_string(),
        "validate=no".to_string(),
    ]);
    runner.run_checked(&spec).await?;

    for (i, server) in rest.iter().enumerate() {
        let spec = CommandSpec::new("netsh").args([
            "interface".to_string(),
            "ipv4".to_string(),
            "add".to_string(),
            "dnsservers".to_string(),
            name.clone(),
            format!("address={}", server),
            format!("index={}", i + 2),
            "validate=no".to_string(),
        ]);
        runner.run_checked(&spec).await?;
    }
    Ok(())
}

/// Write and verify one adapter.
async fn configure_adapter(
    runner: &dyn CommandRunner,
    adapter: &Adapter,
    servers: &[String],
) -> StepOutcome {
    if let Err(e) = write_servers(runner, adapter.index, servers).await {
        tracing::warn!("DNS write failed on {}: {}", adapter.name, e);
        return StepOutcome::failed(&adapter.name, e.to_string());
    }

    match read_servers(runner, &adapter.guid).await {
        Ok(actual) if actual == servers => {
            let shown = if servers.is_empty() {
                "DHCP".to_string()
            } else {
                servers.join(", ")
            };
            tracing::info!("DNS on {} verified: {}", adapter.name, shown);
            StepOutcome::ok(&adapter.name, shown)
        }
        Ok(actual) => {
            tracing::warn!(
                "DNS on {} reads back {:?}, expected {:?}",
                adapter.name,
                actual,
                servers
            );
            StepOutcome::failed(
                &adapter.name,
                format!("reads back [{}]", actual.join(", ")),
            )
        }
        Err(e) => StepOutcome::failed(&adapter.name, format!("read-back failed: {}", e)),
    }
}

async fn flush_resolver_cache(runner: &dyn CommandRunner) -> StepOutcome {
    let spec = CommandSpec::new("ipconfig").arg("/flushdns");
    match runner.run_checked(&spec).await {
        Ok(_) => StepOutcome::ok("Flush DNS cache", "resolver cache flushed"),
        Err(e) => StepOutcome::failed("Flush DNS cache", e.to_string()),
    }
}

pub async fn apply(ctx: &ModuleContext, provider: DnsProvider) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let adapters = require_adapters(runner).await?;

    let mut backup = Vec::with_capacity(adapters.len());
    for adapter in &adapters {
        let servers = match read_servers(runner, &adapter.guid).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Could not read DNS of {}: {}", adapter.name, e);
                Vec::new()
            }
        };
        backup.push(DnsBackupEntry {
            adapter: adapter.name.clone(),
            index: adapter.index,
            guid: adapter.guid.clone(),
            servers,
        });
    }
    ctx.backups.save_best_effort(ModuleId::Dns.key(), &backup);

    let target: Vec<String> = provider.servers().iter().map(|s| s.to_string()).collect();
    tracing::info!("Setting DNS to {} on {} adapter(s)", provider.name(), adapters.len());

    let mut steps = Vec::new();
    for adapter in &adapters {
        steps.push(configure_adapter(runner, adapter, &target).await);
    }
    let configured = steps.iter().filter(|s| s.success).count();
    steps.push(flush_resolver_cache(runner).await);

    let success = configured > 0;
    let message = format!(
        "DNS set to {} on {}/{} adapter(s)",
        provider.name(),
        configured,
        adapters.len()
    );
    Ok(ModuleReport::new(ModuleId::Dns, success, message).with_steps(steps))
}

pub async fn revert(ctx: &ModuleContext) -> Result<ModuleReport> {
    let runner = ctx.runner();
    let snapshot = ctx
        .backups
        .load::<Vec<DnsBackupEntry>>(ModuleId::Dns.key())?;

    let mut steps = Vec::new();
    for entry in &snapshot.data {
        let adapter = Adapter {
            name: entry.adapter.clone(),
            description: String::new(),
            index: entry.index,
            status: String::new(),
            guid: entry.guid.clone(),
            mac_address: None,
        };
        steps.push(configure_adapter(runner, &adapter, &entry.servers).await);
    }
    let restored = steps.iter().filter(|s| s.success).count();
    steps.push(flush_resolver_cache(runner).await);

    let message = format!(
        "Restored DNS from {} on {}/{} adapter(s)",
        snapshot.created.format("%Y-%m-%d %H:%M"),
        restored,
        snapshot.data.len()
    );
    Ok(ModuleReport::new(ModuleId::Dns, restored > 0, message).with_steps(steps))
}

pub async fn status(ctx: &ModuleContext) -> Result<Vec<DnsStatus>> {
    let runner = ctx.runner();
    let adapters = require_adapters(runner).await?;
    let mut result = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let servers = read_servers(runner, &adapter.guid).await.unwrap_or_default();
        result.push(DnsStatus {
            adapter: adapter.name,
            servers,
        });
    }
    Ok(result)
}
