//! Network adapter detection.
//!
//! Adapters come from `Get-NetAdapter`; per-interface MTU and link state
//! come from `netsh interface ipv4 show subinterfaces`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TuneError};
use crate::system::command::{CommandRunner, CommandSpec};
use crate::system::powershell::parse_json_list;

const ADAPTER_SCRIPT: &str = "Get-NetAdapter | Select-Object Name, InterfaceDescription, ifIndex, \
@{n='Status';e={[string]$_.Status}}, InterfaceGuid, MacAddress | ConvertTo-Json -Compress";

/// A network adapter as reported by Windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adapter {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "InterfaceDescription", default)]
    pub description: String,
    #[serde(rename = "ifIndex")]
    pub index: u32,
    #[serde(rename = "Status")]
    pub status: String,
    /// `{GUID}` form, as used under `Tcpip\Parameters\Interfaces`.
    #[serde(rename = "InterfaceGuid")]
    pub guid: String,
    #[serde(rename = "MacAddress", default)]
    pub mac_address: Option<String>,
}

impl Adapter {
    pub fn is_up(&self) -> bool {
        self.status.eq_ignore_ascii_case("Up")
    }

    /// Enabled adapters, whether or not a cable/network is present.
    pub fn is_usable(&self) -> bool {
        self.is_up() || self.status.eq_ignore_ascii_case("Disconnected")
    }
}

/// Every enabled adapter, connected or not.
pub async fn detect_adapters(runner: &dyn CommandRunner) -> Result<Vec<Adapter>> {
    let spec = CommandSpec::powershell(ADAPTER_SCRIPT);
    let output = runner.run_checked(&spec).await?;
    let adapters: Vec<Adapter> = parse_json_list(&output.stdout)?;

    let usable: Vec<Adapter> = adapters.into_iter().filter(Adapter::is_usable).collect();
    tracing::info!("Detected {} usable adapter(s)", usable.len());
    for adapter in &usable {
        tracing::debug!(
            "Adapter {} ({}) status={} guid={}",
            adapter.name,
            adapter.description,
            adapter.status,
            adapter.guid
        );
    }
    Ok(usable)
}

/// Like [`detect_adapters`] but an empty result is an error.
pub async fn require_adapters(runner: &dyn CommandRunner) -> Result<Vec<Adapter>> {
    let adapters = detect_adapters(runner).await?;
    if adapters.is_empty() {
        return Err(TuneError::NoAdapters);
    }
    Ok(adapters)
}

/// One row of `netsh interface ipv4 show subinterfaces`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubInterface {
    pub mtu: u32,
    pub media_sense_state: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub name: String,
}

impl SubInterface {
    pub fn is_connected(&self) -> bool {
        self.media_sense_state == 1
    }

    pub fn is_loopback(&self) -> bool {
        self.name.to_ascii_lowercase().contains("loopback")
    }
}

pub async fn list_subinterfaces(runner: &dyn CommandRunner) -> Result<Vec<SubInterface>> {
    let spec = CommandSpec::new("netsh").args(["interface", "ipv4", "show", "subinterfaces"]);
    let output = runner.run_checked(&spec).await?;
    Ok(parse_subinterfaces(&output.stdout))
}

/// Take the next whitespace-delimited token, returning it and the remainder.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

fn parse_subinterface_line(line: &str) -> Option<SubInterface> {
    let (mtu, rest) = next_token(line)?;
    let (state, rest) = next_token(rest)?;
    let (bytes_in, rest) = next_token(rest)?;
    let (bytes_out, rest) = next_token(rest)?;
    let name = rest.trim();
    if name.is_empty() {
        return None;
    }

    Some(SubInterface {
        mtu: mtu.parse().ok()?,
        media_sense_state: state.parse().ok()?,
        bytes_in: bytes_in.parse().ok()?,
        bytes_out: bytes_out.parse().ok()?,
        name: name.to_string(),
    })
}

/// Parse the subinterface table; header and separator rows are skipped
/// because their leading columns are not numeric.
pub fn parse_subinterfaces(output: &str) -> Vec<SubInterface> {
    output.lines().filter_map(parse_subinterface_line).collect()
}
