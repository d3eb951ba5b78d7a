//! Registry access through `reg.exe`.
//!
//! Every write can be followed by a read of the same value; `set_verified`
//! does both and fails if the read-back differs.

use std::fmt;

use crate::error::{Result, TuneError};
use crate::system::command::{CommandOutput, CommandRunner, CommandSpec};

/// Output `reg query` prints when the key or value is missing.
const NOT_FOUND_MARKER: &str = "unable to find";

/// A typed registry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValue {
    Dword(u32),
    Sz(String),
    ExpandSz(String),
    MultiSz(Vec<String>),
    /// Any other type, kept as reg.exe printed it.
    Other { kind: String, data: String },
}

impl RegValue {
    pub fn kind(&self) -> &str {
        match self {
            RegValue::Dword(_) => "REG_DWORD",
            RegValue::Sz(_) => "REG_SZ",
            RegValue::ExpandSz(_) => "REG_EXPAND_SZ",
            RegValue::MultiSz(_) => "REG_MULTI_SZ",
            RegValue::Other { kind, .. } => kind,
        }
    }

    /// Data formatted the way `reg add /d` expects it.
    fn data_arg(&self) -> String {
        match self {
            RegValue::Dword(v) => v.to_string(),
            RegValue::Sz(s) | RegValue::ExpandSz(s) => s.clone(),
            RegValue::MultiSz(items) => items.join("\\0"),
            RegValue::Other { data, .. } => data.clone(),
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            RegValue::Dword(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegValue::Sz(s) | RegValue::ExpandSz(s) => Some(s),
            _ => None,
        }
    }

    fn parse(kind: &str, data: &str) -> Result<Self> {
        match kind {
            "REG_DWORD" => {
                let hex = data.trim().trim_start_matches("0x");
                u32::from_str_radix(hex, 16)
                    .map(RegValue::Dword)
                    .map_err(|_| TuneError::ParseError(format!("bad REG_DWORD data: {}", data)))
            }
            "REG_SZ" => Ok(RegValue::Sz(data.to_string())),
            "REG_EXPAND_SZ" => Ok(RegValue::ExpandSz(data.to_string())),
            "REG_MULTI_SZ" => Ok(RegValue::MultiSz(
                data.split("\\0")
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            other => Ok(RegValue::Other {
                kind: other.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegValue::Dword(v) => write!(f, "{}", v),
            RegValue::Sz(s) | RegValue::ExpandSz(s) => write!(f, "{:?}", s),
            RegValue::MultiSz(items) => write!(f, "{:?}", items),
            RegValue::Other { kind, data } => write!(f, "{} {}", kind, data),
        }
    }
}

/// A value found under some key by a recursive search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegMatch {
    /// Full key path as reg.exe printed it (`HKEY_LOCAL_MACHINE\...`).
    pub key: String,
    pub name: String,
    pub value: RegValue,
}

/// Registry facade over a command runner.
pub struct Registry<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Registry<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Read one value. Missing key or value is `Ok(None)`.
    pub async fn query(&self, key: &str, name: &str) -> Result<Option<RegValue>> {
        let spec = CommandSpec::new("reg").args(["query", key, "/v", name]);
        let output = self.runner.run(&spec).await?;

        if !output.success() {
            if is_missing(&output) {
                return Ok(None);
            }
            return output.checked(&spec).map(|_| None);
        }

        Ok(parse_query_output(&output.stdout)
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v))
    }

    pub async fn set(&self, key: &str, name: &str, value: &RegValue) -> Result<()> {
        let spec = CommandSpec::new("reg").args([
            "add".to_string(),
            key.to_string(),
            "/v".to_string(),
            name.to_string(),
            "/t".to_string(),
            value.kind().to_string(),
            "/d".to_string(),
            value.data_arg(),
            "/f".to_string(),
        ]);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    /// Write, then read back and compare.
    pub async fn set_verified(&self, key: &str, name: &str, value: &RegValue) -> Result<()> {
        self.set(key, name, value).await?;
        let actual = self.query(key, name).await?;
        match actual {
            Some(ref v) if v == value => {
                tracing::debug!("Verified {}\\{} = {}", key, name, value);
                Ok(())
            }
            other => Err(TuneError::VerificationFailed {
                setting: format!("{}\\{}", key, name),
                expected: value.to_string(),
                actual: other
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "<missing>".into()),
            }),
        }
    }

    /// Delete a value. Returns `false` if it did not exist.
    pub async fn delete(&self, key: &str, name: &str) -> Result<bool> {
        let spec = CommandSpec::new("reg").args(["delete", key, "/v", name, "/f"]);
        let output = self.runner.run(&spec).await?;
        if output.success() {
            return Ok(true);
        }
        if output.combined().contains(NOT_FOUND_MARKER) {
            return Ok(false);
        }
        output.checked(&spec).map(|_| false)
    }

    /// Delete a value and confirm it is gone.
    pub async fn delete_verified(&self, key: &str, name: &str) -> Result<()> {
        self.delete(key, name).await?;
        match self.query(key, name).await? {
            None => Ok(()),
            Some(v) => Err(TuneError::VerificationFailed {
                setting: format!("{}\\{}", key, name),
                expected: "<missing>".into(),
                actual: v.to_string(),
            }),
        }
    }

    /// Find every value named `name` in the subtree of `key`.
    pub async fn search(&self, key: &str, name: &str) -> Result<Vec<RegMatch>> {
        let spec = CommandSpec::new("reg").args(["query", key, "/s", "/v", name]);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            if is_missing(&output) {
                return Ok(Vec::new());
            }
            return output.checked(&spec).map(|_| Vec::new());
        }
        Ok(parse_search_output(&output.stdout))
    }

    /// Direct subkeys of `key`.
    pub async fn subkeys(&self, key: &str) -> Result<Vec<String>> {
        let spec = CommandSpec::new("reg").args(["query", key]);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Ok(Vec::new());
        }
        let prefix = expand_hive(key).to_ascii_lowercase();
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("HKEY_"))
            .filter(|l| {
                let lower = l.to_ascii_lowercase();
                lower != prefix && lower.starts_with(&prefix)
            })
            .map(String::from)
            .collect())
    }
}

/// A failed `reg query` that means "nothing there". reg.exe also exits 1
/// when access is denied, which must surface as an error instead.
fn is_missing(output: &CommandOutput) -> bool {
    if output.is_access_denied() {
        return false;
    }
    output.combined().contains(NOT_FOUND_MARKER) || output.code == Some(1)
}

/// Expand a short hive prefix (`HKLM\...`) to the long form reg.exe prints.
pub fn expand_hive(key: &str) -> String {
    const HIVES: &[(&str, &str)] = &[
        ("HKLM", "HKEY_LOCAL_MACHINE"),
        ("HKCU", "HKEY_CURRENT_USER"),
        ("HKCR", "HKEY_CLASSES_ROOT"),
        ("HKU", "HKEY_USERS"),
    ];
    for (short, long) in HIVES {
        if let Some(rest) = key.strip_prefix(short) {
            if rest.is_empty() || rest.starts_with('\\') {
                return format!("{}{}", long, rest);
            }
        }
    }
    key.to_string()
}

/// Split a value line: `    Name    REG_TYPE    data`.
fn parse_value_line(line: &str) -> Option<(String, RegValue)> {
    let idx = line.find("    REG_")?;
    let name = line[..idx].trim();
    let rest = line[idx..].trim_start();
    let type_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let kind = &rest[..type_end];
    let data = rest[type_end..].trim();
    let value = RegValue::parse(kind, data).ok()?;
    // reg.exe prints the unnamed default value as "(Default)"
    Some((name.to_string(), value))
}

/// Parse the value lines of a `reg query /v` result.
pub fn parse_query_output(output: &str) -> Vec<(String, RegValue)> {
    output.lines().filter_map(parse_value_line).collect()
}

/// Parse a recursive `reg query /s /v` result into key/value matches.
pub fn parse_search_output(output: &str) -> Vec<RegMatch> {
    let mut matches = Vec::new();
    let mut current_key: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("HKEY_") {
            current_key = Some(trimmed.to_string());
        } else if let Some((name, value)) = parse_value_line(line) {
            if let Some(ref key) = current_key {
                matches.push(RegMatch {
                    key: key.clone(),
                    name,
                    value,
                });
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::fake::{fail, ok, ScriptedRunner};

    const TCP_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\Tcpip\Parameters";

    #[test]
    fn test_parse_query_output() {
        let output = r#"
HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Services\Tcpip\Parameters\Interfaces\{6A1F0D2C-1B2E-4C8B-9E0A-0F1E2D3C4B5A}
    NameServer    REG_SZ    1.1.1.1,1.0.0.1
    EnableDHCP    REG_DWORD    0x1
    DhcpNameServer    REG_SZ    192.168.1.1

"#;
        let values = parse_query_output(output);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].0, "NameServer");
        assert_eq!(values[0].1, RegValue::Sz("1.1.1.1,1.0.0.1".into()));
        assert_eq!(values[1].1, RegValue::Dword(1));
    }

    #[test]
    fn test_parse_empty_string_value() {
        let values = parse_query_output("    NameServer    REG_SZ    \n");
        assert_eq!(values[0].1, RegValue::Sz(String::new()));
    }

    #[test]
    fn test_parse_search_output() {
        let output = r#"
HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Class\{4d36e972-e325-11ce-bfc1-08002be10318}\0001
    NetCfgInstanceId    REG_SZ    {AAAA1111-0000-0000-0000-000000000001}

HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Class\{4d36e972-e325-11ce-bfc1-08002be10318}\0007
    NetCfgInstanceId    REG_SZ    {BBBB2222-0000-0000-0000-000000000002}

End of search: 2 match(es) found.
"#;
        let matches = parse_search_output(output);
        assert_eq!(matches.len(), 2);
        assert!(matches[1].key.ends_with("\\0007"));
        assert_eq!(
            matches[1].value.as_str(),
            Some("{BBBB2222-0000-0000-0000-000000000002}")
        );
    }

    #[test]
    fn test_expand_hive() {
        assert_eq!(expand_hive(r"HKLM\SOFTWARE"), r"HKEY_LOCAL_MACHINE\SOFTWARE");
        assert_eq!(expand_hive(r"HKEY_USERS\x"), r"HKEY_USERS\x");
        assert_eq!(expand_hive(r"HKLMX\y"), r"HKLMX\y");
    }

    #[tokio::test]
    async fn test_query_missing_value() {
        let runner = ScriptedRunner::new().on(
            "reg query",
            fail(
                1,
                "ERROR: The system was unable to find the specified registry key or value.",
            ),
        );
        let registry = Registry::new(&runner);
        assert_eq!(registry.query(TCP_KEY, "KeepAliveTime").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_query_access_denied_is_not_missing() {
        let runner = ScriptedRunner::new().on("reg query", fail(1, "ERROR: Access is denied."));
        let registry = Registry::new(&runner);
        let err = registry.query(TCP_KEY, "KeepAliveTime").await.unwrap_err();
        assert!(matches!(err, TuneError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_search_failures() {
        let runner = ScriptedRunner::new().on("reg query", fail(1, "ERROR: Access is denied."));
        let registry = Registry::new(&runner);
        let err = registry.search(TCP_KEY, "NetCfgInstanceId").await.unwrap_err();
        assert!(matches!(err, TuneError::PermissionDenied));

        let runner = ScriptedRunner::new().on("reg query", fail(2, "ERROR: Invalid syntax."));
        let registry = Registry::new(&runner);
        let err = registry.search(TCP_KEY, "NetCfgInstanceId").await.unwrap_err();
        assert!(matches!(err, TuneError::CommandFailed { .. }));

        let runner = ScriptedRunner::new().on("reg query", fail(1, "End of search: 0 match(es) found."));
        let registry = Registry::new(&runner);
        assert!(registry.search(TCP_KEY, "NetCfgInstanceId").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_verified_reads_back() {
        let runner = ScriptedRunner::new()
            .on("reg add", ok("The operation completed successfully."))
            .on(
                "reg query",
                ok("    KeepAliveTime    REG_DWORD    0x6ddd00\n"),
            );
        let registry = Registry::new(&runner);
        registry
            .set_verified(TCP_KEY, "KeepAliveTime", &RegValue::Dword(7_200_000))
            .await
            .unwrap();
        assert!(runner.called("/t REG_DWORD /d 7200000 /f"));
    }

    #[tokio::test]
    async fn test_set_verified_detects_mismatch() {
        let runner = ScriptedRunner::new()
            .on("reg add", ok(""))
            .on("reg query", ok("    DefaultTTL    REG_DWORD    0x80\n"));
        let registry = Registry::new(&runner);
        let err = registry
            .set_verified(TCP_KEY, "DefaultTTL", &RegValue::Dword(64))
            .await
            .unwrap_err();
        assert!(matches!(err, TuneError::VerificationFailed { .. }));
    }
}
