//! Harness configuration
//!
//! Defaults target a stock `php` + `kphp` toolchain on `PATH`. A TOML file can
//! replace any of it, and command-line flags override the file:
//!
//! ```toml
//! root = "tests/phpt"
//! timeout_secs = 60
//! skip_modifiers = ["benchmark"]
//!
//! [reference]
//! program = "/usr/bin/php7.4"
//! args = ["-n", "-d", "memory_limit=3G", "-f", "{input}"]
//!
//! [subject.compile]
//! program = "/opt/kphp/objs/bin/kphp2cpp"
//! args = ["-M", "cli", "-o", "{output}", "{input}"]
//!
//! [subject.run]
//! args = ["--Xkphp-options", "--disable-sql"]
//! ```

use crate::directive::Modifiers;
use crate::driver::{ArtifactRun, SubjectPipeline};
use crate::engine::EngineSpec;
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the orchestrator needs to run a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Directory searched recursively for tests
    pub root: PathBuf,
    /// File extension of test scripts, without the dot
    pub suffix: String,
    /// Only run tests whose root-relative path contains this string
    pub filter: Option<String>,
    /// Worker threads; 0 means one per available CPU
    pub jobs: usize,
    /// Per-invocation wall-clock limit
    #[serde(rename = "timeout_secs", serialize_with = "ser_secs", deserialize_with = "de_secs")]
    pub timeout: Duration,
    /// Tests carrying any of these modifiers are reported as skipped
    pub skip_modifiers: Vec<String>,
    pub reference: EngineSpec,
    pub subject: SubjectPipeline,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tests/phpt"),
            suffix: "php".to_string(),
            filter: None,
            jobs: 0,
            timeout: Duration::from_secs(30),
            skip_modifiers: Vec::new(),
            reference: EngineSpec::new("php").with_args(["-n", "-f", "{input}"]),
            subject: SubjectPipeline {
                compile: EngineSpec::new("kphp").with_args(["-M", "cli", "-o", "{output}", "{input}"]),
                run: Some(ArtifactRun::default()),
            },
        }
    }
}

impl HarnessConfig {
    /// Load a TOML configuration file; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("failed to read config {}", path.display()), e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".to_string()));
        }
        if self.suffix.is_empty() {
            return Err(Error::Config("test suffix must not be empty".to_string()));
        }
        self.skipped_modifiers()?;
        Ok(())
    }

    /// `skip_modifiers` as a flag set
    pub fn skipped_modifiers(&self) -> Result<Modifiers> {
        self.skip_modifiers.iter().try_fold(Modifiers::empty(), |acc, token| {
            Modifiers::from_token(token)
                .map(|flag| acc | flag)
                .ok_or_else(|| Error::Config(format!("unknown modifier `{}` in skip list", token)))
        })
    }

    /// Number of worker threads to start
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

fn ser_secs<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

fn de_secs<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
