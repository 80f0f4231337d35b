//! Suite report rendering
//!
//! Records are kept in discovery order so two runs over the same tree print
//! the same report regardless of which worker finished first.

use crate::directive::{Modifiers, VerdictKind};
use crate::matcher::Verdict;
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of a single test file
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    /// Root-relative path
    pub name: String,
    /// Declared kind; `None` when the directive block was rejected or the file
    /// was never read
    pub kind: Option<VerdictKind>,
    pub modifiers: Modifiers,
    pub verdict: Verdict,
    pub duration: Duration,
}

impl TestRecord {
    /// Record for a test that never got as far as a parsed directive
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            modifiers: Modifiers::empty(),
            verdict: Verdict::Error(message.into()),
            duration: Duration::ZERO,
        }
    }
}

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Counts plus every non-passing test
    #[default]
    Summary,
    /// Every test result
    Verbose,
    /// JSON for CI
    Json,
    /// TAP format
    Tap,
}

/// Results for one top-level directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryResult {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl DirectoryResult {
    pub fn pass_rate(&self) -> f64 {
        let runnable = self.total - self.skipped;
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }
}

/// Aggregate outcome of a suite run
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    /// One record per discovered test, in discovery order
    pub records: Vec<TestRecord>,
    pub directories: BTreeMap<String, DirectoryResult>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
    /// The run was interrupted
    pub cancelled: bool,
}

impl SuiteReport {
    pub fn new(records: Vec<TestRecord>, elapsed: Duration, cancelled: bool) -> Self {
        let mut report = Self {
            elapsed,
            cancelled,
            ..Default::default()
        };
        for record in records {
            report.add_record(record);
        }
        report
    }

    /// Append a record and update the counters
    pub fn add_record(&mut self, record: TestRecord) {
        let directory = match record.name.split_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        };
        let entry = self
            .directories
            .entry(directory.clone())
            .or_insert_with(|| DirectoryResult {
                name: directory,
                ..Default::default()
            });

        self.total += 1;
        entry.total += 1;
        match record.verdict {
            Verdict::Pass => {
                self.passed += 1;
                entry.passed += 1;
            }
            Verdict::Fail { .. } => {
                self.failed += 1;
                entry.failed += 1;
            }
            Verdict::Error(_) => {
                self.errors += 1;
                entry.errors += 1;
            }
            Verdict::Skip(_) => {
                self.skipped += 1;
                entry.skipped += 1;
            }
        }
        self.records.push(record);
    }

    /// Whether every test passed or was skipped
    pub fn success(&self) -> bool {
        !self.cancelled && self.failed == 0 && self.errors == 0
    }

    /// Process exit code for this report
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// Overall pass rate of runnable tests as a percentage
    pub fn pass_rate(&self) -> f64 {
        let runnable = self.total - self.skipped;
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }

    /// Failing and erroring tests, in discovery order
    pub fn failing_tests(&self) -> Vec<&TestRecord> {
        self.records.iter().filter(|r| r.verdict.is_failure()).collect()
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Summary => self.format_summary(false),
            OutputFormat::Verbose => self.format_summary(true),
            OutputFormat::Json => {
                // a Value always serializes
                serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
            }
            OutputFormat::Tap => self.to_tap(),
        }
    }

    /// Human-readable report. Non-passing tests always get full detail; with
    /// `verbose` passing tests are listed as well.
    pub fn format_summary(&self, verbose: bool) -> String {
        let mut s = String::new();
        s.push_str("\n=== Differential Test Report ===\n\n");

        for record in &self.records {
            if !verbose && matches!(record.verdict, Verdict::Pass) {
                continue;
            }
            s.push_str(&format!("{:<6}{}", record.verdict.label(), record.name));
            if verbose {
                s.push_str(&format!(" ({:?})", record.duration));
            }
            s.push('\n');
            let reason = record.verdict.reason();
            if !reason.is_empty() {
                s.push_str(&format!("      {}\n", reason));
            }
            for line in record.verdict.detail().lines() {
                s.push_str(&format!("      | {}\n", line));
            }
        }
        if self.cancelled {
            s.push_str("\nRun was cancelled; unfinished tests are reported as errors.\n");
        }

        s.push_str(&format!(
            "\nTotal: {} | Pass: {} | Fail: {} | Error: {} | Skip: {}\n",
            self.total, self.passed, self.failed, self.errors, self.skipped
        ));
        s.push_str(&format!(
            "Pass Rate: {:.1}% ({}/{})\n",
            self.pass_rate(),
            self.passed,
            self.total - self.skipped
        ));
        s.push_str(&format!("Time: {:?}\n\n", self.elapsed));

        s.push_str("Per-Directory Results:\n");
        s.push_str(&format!(
            "{:<30} {:>6} {:>6} {:>6} {:>6} {:>6} {:>7}\n",
            "Directory", "Total", "Pass", "Fail", "Error", "Skip", "Rate"
        ));
        s.push_str(&"-".repeat(73));
        s.push('\n');
        for dir in self.directories.values() {
            s.push_str(&format!(
                "{:<30} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6.1}%\n",
                dir.name,
                dir.total,
                dir.passed,
                dir.failed,
                dir.errors,
                dir.skipped,
                dir.pass_rate()
            ));
        }

        s
    }

    /// Export as JSON: summary counts plus one record per test
    pub fn to_json(&self) -> serde_json::Value {
        let directories: serde_json::Map<String, serde_json::Value> = self
            .directories
            .iter()
            .map(|(name, dir)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "total": dir.total,
                        "passed": dir.passed,
                        "failed": dir.failed,
                        "errors": dir.errors,
                        "skipped": dir.skipped,
                        "pass_rate": dir.pass_rate(),
                    }),
                )
            })
            .collect();

        let tests: Vec<serde_json::Value> = self
            .records
            .iter()
            .map(|record| {
                serde_json::json!({
                    "path": record.name,
                    "kind": record.kind.map(|k| k.tag()),
                    "modifiers": record.modifiers.tokens(),
                    "verdict": record.verdict.label(),
                    "reason": record.verdict.reason(),
                    "detail": record.verdict.detail(),
                    "duration_ms": record.duration.as_millis() as u64,
                })
            })
            .collect();

        serde_json::json!({
            "total": self.total,
            "passed": self.passed,
            "failed": self.failed,
            "errors": self.errors,
            "skipped": self.skipped,
            "cancelled": self.cancelled,
            "pass_rate": self.pass_rate(),
            "total_time_ms": self.elapsed.as_millis() as u64,
            "directories": directories,
            "tests": tests,
        })
    }

    /// Export as TAP (Test Anything Protocol) for CI
    pub fn to_tap(&self) -> String {
        let mut s = format!("TAP version 13\n1..{}\n", self.records.len());
        for (i, record) in self.records.iter().enumerate() {
            let n = i + 1;
            match &record.verdict {
                Verdict::Pass => s.push_str(&format!("ok {} - {}\n", n, record.name)),
                Verdict::Skip(reason) => {
                    s.push_str(&format!("ok {} - {} # SKIP {}\n", n, record.name, reason))
                }
                verdict => {
                    s.push_str(&format!("not ok {} - {}\n", n, record.name));
                    s.push_str(&format!(
                        "  ---\n  verdict: {}\n  message: {}\n  ---\n",
                        verdict.label(),
                        verdict.reason()
                    ));
                }
            }
        }
        s
    }
}
