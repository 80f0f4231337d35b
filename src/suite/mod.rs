//! Suite orchestrator
//!
//! Discovers test scripts, fans them out over a fixed pool of worker threads
//! and gathers one [`TestRecord`] per file. Workers claim tests from a shared
//! cursor and send records to a single collector over a channel; nothing else
//! is shared between them.

pub mod report;

pub use report::{DirectoryResult, OutputFormat, SuiteReport, TestRecord};

use crate::cancel::CancelToken;
use crate::config::HarnessConfig;
use crate::directive::{self, Modifiers};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::matcher::{match_outcome, Verdict};
use crate::testfile::{display_name, TestFile};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Find every `*.{suffix}` file under `root`, in lexical path order.
///
/// A missing root or an empty result is an error: a suite that runs nothing
/// is misconfigured, not green.
pub fn discover_tests(root: &Path, suffix: &str, filter: Option<&str>) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }

    let mut tests = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != suffix) {
            continue;
        }
        if let Some(filter) = filter {
            if !display_name(path, root).contains(filter) {
                continue;
            }
        }
        tests.push(path.to_path_buf());
    }

    if tests.is_empty() {
        return Err(Error::NoTestsDiscovered(root.to_path_buf()));
    }
    Ok(tests)
}

/// Runs a whole suite with the configured engines
pub struct Suite {
    config: HarnessConfig,
    driver: Driver,
    skipped: Modifiers,
    cancel: CancelToken,
}

impl Suite {
    pub fn new(config: HarnessConfig, cancel: CancelToken) -> Result<Self> {
        config.validate()?;
        let skipped = config.skipped_modifiers()?;
        let driver = Driver::from_config(&config, cancel.clone());
        Ok(Self {
            config,
            driver,
            skipped,
            cancel,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        discover_tests(&self.config.root, &self.config.suffix, self.config.filter.as_deref())
    }

    /// Discover and run every test. Only discovery problems are returned as
    /// errors; per-test problems become records.
    pub fn run(&self) -> Result<SuiteReport> {
        let tests = self.discover()?;
        let workers = self.config.worker_count().clamp(1, tests.len());
        info!(root = %self.config.root.display(), tests = tests.len(), workers, "running suite");

        let started = Instant::now();
        let cursor = AtomicUsize::new(0);
        let mut slots: Vec<Option<TestRecord>> = (0..tests.len()).map(|_| None).collect();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, TestRecord)>();
            for _ in 0..workers {
                let tx = tx.clone();
                let (cursor, tests) = (&cursor, &tests);
                scope.spawn(move || loop {
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = tests.get(idx) else { break };
                    if tx.send((idx, self.run_test(path))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (idx, record) in rx {
                slots[idx] = Some(record);
            }
        });

        let records = slots
            .into_iter()
            .zip(&tests)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| {
                    TestRecord::error(display_name(path, &self.config.root), "worker exited without a result")
                })
            })
            .collect();

        let report = SuiteReport::new(records, started.elapsed(), self.cancel.is_cancelled());
        info!(
            passed = report.passed,
            failed = report.failed,
            errors = report.errors,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "suite finished"
        );
        Ok(report)
    }

    /// Parse, drive and judge a single test file
    pub fn run_test(&self, path: &Path) -> TestRecord {
        let name = display_name(path, &self.config.root);
        if self.cancel.is_cancelled() {
            return TestRecord::error(name, Error::Cancelled.to_string());
        }

        let started = Instant::now();
        let file = match TestFile::read(path, &self.config.root) {
            Ok(file) => file,
            Err(e) => return TestRecord::error(name, e.to_string()),
        };
        let expectation = match directive::parse(&file.source) {
            Ok(expectation) => expectation,
            Err(e) => return TestRecord::error(name, Error::from(e).to_string()),
        };

        let disabled = expectation.modifiers & self.skipped;
        let verdict = if !disabled.is_empty() {
            Verdict::Skip(format!("disabled modifier(s): {}", disabled.tokens().join(", ")))
        } else {
            match self.driver.execute(&file, &expectation) {
                Ok(outcome) => match_outcome(&expectation, &outcome),
                Err(e) => Verdict::Error(e.to_string()),
            }
        };

        let duration = started.elapsed();
        debug!(test = %name, verdict = verdict.label(), duration_ms = duration.as_millis() as u64, "test finished");

        TestRecord {
            name,
            kind: Some(expectation.verdict_kind()),
            modifiers: expectation.modifiers,
            verdict,
            duration,
        }
    }
}
