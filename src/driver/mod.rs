//! Dual-engine driver
//!
//! Runs one test through the reference interpreter and the subject pipeline
//! (compile, then optionally execute the compiled artifact) and hands back the
//! raw [`Outcome`]. No judgment happens here; see [`crate::matcher`].

use crate::cancel::CancelToken;
use crate::config::HarnessConfig;
use crate::directive::{Expectation, VerdictKind};
use crate::engine::{
    EngineResult, EngineRunner, EngineSpec, InputMode, ARTIFACT_PLACEHOLDER, OUTPUT_PLACEHOLDER,
};
use crate::error::{Error, Result};
use crate::testfile::TestFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// File name of the compiled artifact inside the per-test build directory
pub const ARTIFACT_NAME: &str = "artifact";

/// How to execute a compiled artifact
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactRun {
    /// Program that runs the artifact; when absent the artifact itself is executed
    #[serde(default)]
    pub launcher: Option<PathBuf>,
    /// Argument template, `{artifact}` is replaced with the artifact path
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ArtifactRun {
    /// Engine spec that runs `artifact`
    pub fn spec_for(&self, artifact: &Path) -> EngineSpec {
        let mut spec = match &self.launcher {
            Some(launcher) => EngineSpec::new(launcher.clone()),
            None => EngineSpec::new(artifact.to_path_buf()),
        };
        spec.args = self.args.clone();
        spec.env = self.env.clone();
        spec.input = InputMode::None;
        if self.launcher.is_some() && !spec.uses(ARTIFACT_PLACEHOLDER) {
            spec.args.insert(0, ARTIFACT_PLACEHOLDER.to_string());
        }
        spec.substitute(ARTIFACT_PLACEHOLDER, artifact)
    }
}

/// The compiler under test, plus how to run what it builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPipeline {
    pub compile: EngineSpec,
    /// Absent for single-step subjects whose compile step already runs the script
    #[serde(default)]
    pub run: Option<ArtifactRun>,
}

/// Subject pipeline steps, kept apart so diagnostics can be taken from the
/// compile step alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectResult {
    pub compile: EngineResult,
    /// Present only when the artifact was executed
    pub run: Option<EngineResult>,
}

impl SubjectResult {
    /// The single logical result: the compile step when it failed or nothing
    /// was run, otherwise the artifact run
    pub fn collapsed(&self) -> &EngineResult {
        match &self.run {
            Some(run) if self.compile.success() => run,
            _ => &self.compile,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.compile.timed_out || self.run.as_ref().is_some_and(|run| run.timed_out)
    }
}

/// Raw results of one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// `None` when the test opted out of the reference run
    pub reference: Option<EngineResult>,
    pub subject: SubjectResult,
}

/// Drives the reference and subject engines for single tests
#[derive(Debug, Clone)]
pub struct Driver {
    reference: EngineSpec,
    subject: SubjectPipeline,
    runner: EngineRunner,
    timeout: Duration,
}

impl Driver {
    pub fn new(reference: EngineSpec, subject: SubjectPipeline, runner: EngineRunner, timeout: Duration) -> Self {
        Self {
            reference,
            subject,
            runner,
            timeout,
        }
    }

    pub fn from_config(config: &HarnessConfig, cancel: CancelToken) -> Self {
        Self::new(
            config.reference.clone(),
            config.subject.clone(),
            EngineRunner::new(cancel),
            config.timeout,
        )
    }

    /// Run `test` through both engines. The reference and subject run
    /// concurrently; both have finished when this returns.
    pub fn execute(&self, test: &TestFile, expectation: &Expectation) -> Result<Outcome> {
        if expectation.skips_reference() {
            debug!(test = %test.name, "reference run skipped");
            let subject = self.run_subject(test, expectation)?;
            return Ok(Outcome {
                reference: None,
                subject,
            });
        }

        thread::scope(|scope| {
            let reference = scope.spawn(|| self.runner.run(&self.reference, &test.source, self.timeout));
            let subject = self.run_subject(test, expectation);
            let reference = reference
                .join()
                .unwrap_or_else(|payload| std::panic::resume_unwind(payload));

            match (reference, subject) {
                (Ok(reference), Ok(subject)) => Ok(Outcome {
                    reference: Some(reference),
                    subject,
                }),
                (Err(Error::Cancelled), _) | (_, Err(Error::Cancelled)) => Err(Error::Cancelled),
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        })
    }

    fn run_subject(&self, test: &TestFile, expectation: &Expectation) -> Result<SubjectResult> {
        let build_dir = tempfile::Builder::new()
            .prefix("phpt-build-")
            .tempdir()
            .map_err(|e| Error::io("failed to create build directory", e))?;
        let artifact = build_dir.path().join(ARTIFACT_NAME);

        let compile_spec = self.subject.compile.substitute(OUTPUT_PLACEHOLDER, &artifact);
        let compile = self.runner.run(&compile_spec, &test.source, self.timeout)?;

        // diagnostic-only kinds are judged on the compile step
        let wants_run = matches!(
            expectation.verdict_kind(),
            VerdictKind::Ok | VerdictKind::RuntimeShouldWarn
        );

        // a successful build must leave something runnable behind
        if compile.success() && self.subject.compile.uses(OUTPUT_PLACEHOLDER) && !artifact.exists() {
            return Err(Error::MissingArtifact(artifact));
        }

        let run = match &self.subject.run {
            Some(run) if wants_run && compile.success() => {
                Some(self.runner.run(&run.spec_for(&artifact), &[], self.timeout)?)
            }
            _ => None,
        };

        Ok(SubjectResult { compile, run })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, stdout: &str) -> EngineResult {
        EngineResult {
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            duration: Duration::ZERO,
            timed_out: false,
            truncated: false,
        }
    }

    #[test]
    fn test_collapsed_prefers_run_after_successful_compile() {
        let subject = SubjectResult {
            compile: result(0, "compiled"),
            run: Some(result(0, "2")),
        };
        assert_eq!(subject.collapsed().stdout, b"2");
    }

    #[test]
    fn test_collapsed_uses_compile_on_failure() {
        let subject = SubjectResult {
            compile: result(1, "error"),
            run: None,
        };
        assert_eq!(subject.collapsed().exit_code, 1);
    }

    #[test]
    fn test_subject_timeout_in_either_step() {
        let mut hung = result(-1, "");
        hung.timed_out = true;
        let subject = SubjectResult {
            compile: result(0, ""),
            run: Some(hung),
        };
        assert!(subject.timed_out());
    }

    #[test]
    fn test_artifact_run_without_launcher() {
        let run = ArtifactRun {
            args: vec!["--Xkphp-options".into(), "--disable-sql".into()],
            ..Default::default()
        };
        let spec = run.spec_for(Path::new("/tmp/build/artifact"));
        assert_eq!(spec.program, PathBuf::from("/tmp/build/artifact"));
        assert_eq!(spec.args, vec!["--Xkphp-options", "--disable-sql"]);
        assert_eq!(spec.input, InputMode::None);
    }

    #[test]
    fn test_artifact_run_with_launcher() {
        let run = ArtifactRun {
            launcher: Some(PathBuf::from("/bin/sh")),
            ..Default::default()
        };
        let spec = run.spec_for(Path::new("/tmp/build/artifact"));
        assert_eq!(spec.program, PathBuf::from("/bin/sh"));
        assert_eq!(spec.args, vec!["/tmp/build/artifact"]);
    }
}
