//! Engine invocation
//!
//! An engine is any external executable the harness drives: the reference
//! interpreter, the compiler under test, or an artifact the compiler produced.
//! The harness never looks inside them; it only feeds them a script and records
//! what came back.
//!
//! # Example
//!
//! ```no_run
//! use phpt_difftest::cancel::CancelToken;
//! use phpt_difftest::engine::{EngineRunner, EngineSpec, InputMode};
//! use std::time::Duration;
//!
//! let php = EngineSpec::new("php").with_args(["-n", "{input}"]);
//! let runner = EngineRunner::new(CancelToken::new());
//! let result = runner.run(&php, b"<?php echo 1+1;", Duration::from_secs(10))?;
//! assert_eq!(result.stdout, b"2");
//! # Ok::<(), phpt_difftest::Error>(())
//! ```

mod process;

pub use process::EngineRunner;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit code recorded for an invocation killed on timeout
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Bytes kept per output stream; the rest is drained and discarded
pub const DEFAULT_OUTPUT_LIMIT: u64 = 64 * 1024 * 1024;

/// Replaced with the path of the staged input file
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Replaced with the path the compiler should write its artifact to
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Replaced with the path of the compiled artifact when running it
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// How an engine receives the test script. Fixed per engine, never per test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Written to a temporary file whose path is substituted for `{input}`
    #[default]
    File,
    /// Piped to standard input
    Stdin,
    /// The engine takes no input (standard input is closed)
    None,
}

fn default_input_suffix() -> String {
    ".php".to_string()
}

/// How to launch one engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Executable path or name resolved through `PATH`
    pub program: PathBuf,
    /// Argument template; see the `*_PLACEHOLDER` constants
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub input: InputMode,
    /// Extension given to staged input files
    #[serde(default = "default_input_suffix")]
    pub input_suffix: String,
    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl EngineSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            input: InputMode::File,
            input_suffix: default_input_suffix(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input(mut self, input: InputMode) -> Self {
        self.input = input;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy of this spec with every occurrence of `placeholder` in the
    /// argument template replaced by `value`
    pub fn substitute(&self, placeholder: &str, value: &Path) -> Self {
        let value = value.to_string_lossy();
        Self {
            args: self
                .args
                .iter()
                .map(|arg| arg.replace(placeholder, &value))
                .collect(),
            ..self.clone()
        }
    }

    /// Whether the argument template mentions `placeholder`
    pub fn uses(&self, placeholder: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(placeholder))
    }
}

/// What one engine invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResult {
    /// Process exit code, `128 + signal` when killed by a signal, or
    /// [`TIMEOUT_EXIT_CODE`] when the harness killed it
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Wall-clock time from spawn to reap
    pub duration: Duration,
    pub timed_out: bool,
    /// stdout or stderr exceeded the capture limit and was cut off
    pub truncated: bool,
}

impl EngineResult {
    /// Exited 0 without being killed
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
