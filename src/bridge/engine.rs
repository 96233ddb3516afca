//! External engine process lifecycle.
//!
//! The engine is launched with the session base URL and the bridge's port as
//! its last two arguments, and reads its tuning from the
//! `turbo_request_conf` environment variable.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use url::Url;

/// Environment variable carrying [`EngineConfig`] as JSON.
pub const ENGINE_CONFIG_ENV: &str = "turbo_request_conf";

/// Request engine strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    #[default]
    Threaded = 2,
    Http2 = 3,
}

impl Serialize for EngineMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for EngineMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            2 => Ok(EngineMode::Threaded),
            3 => Ok(EngineMode::Http2),
            other => Err(serde::de::Error::custom(format!(
                "unknown engine mode {other}"
            ))),
        }
    }
}

/// Engine tuning, forwarded verbatim. The bridge itself never retries or
/// pools; these knobs only shape what the engine does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub concurrent_connections: usize,
    pub requests_per_connection: usize,
    pub pipeline: bool,
    pub max_retries_per_request: usize,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub engine: EngineMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrent_connections: 100,
            requests_per_connection: 1000,
            pipeline: true,
            max_retries_per_request: 5,
            timeout: 10,
            engine: EngineMode::Threaded,
        }
    }
}

/// What a launcher needs to start an engine.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub base_url: &'a Url,
    pub port: u16,
    pub config: &'a EngineConfig,
    /// Forward the engine's output to tracing instead of discarding it.
    pub capture_output: bool,
}

/// Starts an engine that will connect back to `ctx.port`.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self, ctx: &LaunchContext<'_>) -> Result<Box<dyn EngineHandle>, NetError>;
}

/// A running engine.
pub trait EngineHandle: Send {
    /// Stop the engine. Must be idempotent.
    fn terminate(&mut self);
}

/// Launch an engine executable.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(String, String)>,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add a leading argument (before base URL and port).
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Turbo Intruder bundle in `dir`: `turbo.jar` run by the JVM with the
    /// `request.py` script and `request.txt` template.
    ///
    /// Java is taken from `JAVA_HOME` when set, else from `PATH`.
    pub fn turbo_intruder(dir: impl AsRef<Path>) -> Result<Self, NetError> {
        let dir = dir.as_ref();
        let jar = dir.join("turbo.jar");
        if !jar.is_file() {
            tracing::error!(path = %jar.display(), "engine jar not found");
            return Err(NetError::EngineUnavailable);
        }

        Ok(Self::new(java_executable())
            .arg("-jar")
            .arg(jar)
            .arg(dir.join("request.py"))
            .arg(dir.join("request.txt")))
    }
}

fn java_executable() -> PathBuf {
    let binary = if cfg!(windows) { "java.exe" } else { "java" };
    match std::env::var_os("JAVA_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join("bin").join(binary),
        _ => PathBuf::from(binary),
    }
}

impl EngineLauncher for EngineCommand {
    fn launch(&self, ctx: &LaunchContext<'_>) -> Result<Box<dyn EngineHandle>, NetError> {
        let config = serde_json::to_string(ctx.config).map_err(|_| NetError::JsonParseError)?;
        let output = || {
            if ctx.capture_output {
                Stdio::piped()
            } else {
                Stdio::null()
            }
        };

        let program = self.program.display().to_string();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(ctx.base_url.as_str())
            .arg(ctx.port.to_string())
            .env(ENGINE_CONFIG_ENV, config)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
            .spawn_context(&program)?;

        tracing::debug!(program = %program, pid = ?child.id(), port = ctx.port, "engine started");

        if let Some(stdout) = child.stdout.take() {
            drain_output(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            drain_output(stderr, "stderr");
        }

        Ok(Box::new(ProcessHandle { child }))
    }
}

/// Engine running as a child process. Killed on terminate or drop.
pub struct ProcessHandle {
    child: Child,
}

impl EngineHandle for ProcessHandle {
    fn terminate(&mut self) {
        match self.child.start_kill() {
            Ok(()) => tracing::debug!(pid = ?self.child.id(), "engine terminated"),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => tracing::warn!(error = %e, "failed to terminate engine"),
        }
    }
}

/// Forward engine output line by line to tracing, off the dispatch path.
pub fn drain_output<R>(stream: R, name: &'static str) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::debug!(target: "turbonet::engine", stream = name, "{}", line),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(target: "turbonet::engine", stream = name, error = %e, "engine output ended");
                    break;
                }
            }
        }
    })
}
