//! Process execution behind a trait so modules can run against canned output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Result, TuneError};

/// Default per-process timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Markers Windows tools print when the caller is not elevated.
const ACCESS_DENIED_MARKERS: &[&str] = &[
    "Access is denied",
    "access denied",
    "requires elevation",
    "Run as administrator",
    "PermissionDenied",
];

/// A process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Text written to the child's stdin, then closed.
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A PowerShell one-liner run without profile or prompts.
    pub fn powershell(script: impl Into<String>) -> Self {
        Self::new("powershell").args([
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-ExecutionPolicy".to_string(),
            "Bypass".to_string(),
            "-Command".to_string(),
            script.into(),
        ])
    }

    /// Human-readable command line, used in logs and errors.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    pub fn is_access_denied(&self) -> bool {
        let text = self.combined();
        ACCESS_DENIED_MARKERS.iter().any(|m| text.contains(m))
    }

    /// Turn a non-zero exit into an error, mapping elevation failures
    /// to `PermissionDenied`.
    pub fn checked(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        if self.is_access_denied() {
            return Err(TuneError::PermissionDenied);
        }
        let message = first_meaningful_line(&self.combined())
            .unwrap_or_else(|| format!("exit code {:?}", self.code));
        Err(TuneError::CommandFailed {
            command: spec.display(),
            message,
        })
    }
}

fn first_meaningful_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}

/// Runs processes. The real implementation spawns them; tests script them.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run and fail on a non-zero exit.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.run(spec).await?.checked(spec)
    }
}

/// Spawns real child processes via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("exec: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW: keep console tools from flashing a window over the TUI
            command.creation_flags(0x0800_0000);
        }

        let mut child = command.spawn().map_err(|e| TuneError::CommandFailed {
            command: spec.display(),
            message: e.to_string(),
        })?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| TuneError::CommandFailed {
                    command: spec.display(),
                    message: format!("writing stdin: {}", e),
                })?;
            drop(stdin);
        }

        // On timeout the child is dropped and killed (kill_on_drop).
        let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| TuneError::Timeout {
                command: spec.display(),
                seconds: spec.timeout.as_secs(),
            })?
            .map_err(|e| TuneError::CommandFailed {
                command: spec.display(),
                message: e.to_string(),
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: decode_console_output(&output.stdout),
            stderr: decode_console_output(&output.stderr),
        };
        tracing::debug!("exit {:?}: {}", result.code, spec.display());
        Ok(result)
    }
}

/// Decode console output that may be UTF-16LE (sfc, some DISM builds) or
/// 8-bit. Line endings are normalised to `\n`.
pub fn decode_console_output(bytes: &[u8]) -> String {
    let text = if looks_like_utf16le(bytes) {
        let start = if bytes.starts_with(&[0xFF, 0xFE]) { 2 } else { 0 };
        let units: Vec<u16> = bytes[start..]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    text.replace("\r\n", "\n").replace('\r', "").replace('\0', "")
}

fn looks_like_utf16le(bytes: &[u8]) -> bool {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return true;
    }
    if bytes.len() < 4 {
        return false;
    }
    // ASCII text in UTF-16LE has a zero in every odd byte.
    let odd = bytes.iter().skip(1).step_by(2);
    let total = bytes.len() / 2;
    let zeros = odd.filter(|b| **b == 0).count();
    zeros * 10 >= total * 9
}

#[cfg(test)]
pub mod fake {
    //! Scripted runner for unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Rule {
        pattern: String,
        responses: Vec<CommandOutput>,
    }

    /// Serves canned output for commands whose display line contains a
    /// pattern. Rules are checked in insertion order. Multiple responses for
    /// a rule are served in turn; the last one repeats.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<String>>,
    }

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// What `reg query` prints for a missing key or value.
    pub fn not_found() -> CommandOutput {
        fail(
            1,
            "ERROR: The system was unable to find the specified registry key or value.",
        )
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
            self.on_seq(pattern, vec![output])
        }

        pub fn on_seq(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
            self.rules.lock().unwrap().push(Rule {
                pattern: pattern.to_string(),
                responses: outputs,
            });
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn called(&self, pattern: &str) -> bool {
            self.calls().iter().any(|c| c.contains(pattern))
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let line = spec.display();
            self.calls.lock().unwrap().push(line.clone());

            let mut rules = self.rules.lock().unwrap();
            for rule in rules.iter_mut() {
                if line.contains(&rule.pattern) {
                    if rule.responses.len() > 1 {
                        return Ok(rule.responses.remove(0));
                    }
                    return Ok(rule.responses.first().cloned().unwrap_or_else(|| ok("")));
                }
            }
            Ok(ok(""))
        }
    }

    /// Succeeds with empty output after `delay` and records how many
    /// commands were in flight at once. With `only`, other commands return
    /// immediately and are not counted.
    pub struct SlowRunner {
        delay: Duration,
        only: Option<String>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    /// Decrements the in-flight count even when the future is dropped mid-sleep.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl SlowRunner {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                only: None,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn only(mut self, pattern: &str) -> Self {
            self.only = Some(pattern.to_string());
            self
        }

        pub fn max_concurrent(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for SlowRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let line = spec.display();
            self.calls.lock().unwrap().push(line.clone());
            if self.only.as_deref().is_some_and(|p| !line.contains(p)) {
                return Ok(ok(""));
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.active);
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(ok(""))
        }
    }
}
