//! Diagnostic matcher
//!
//! Turns an [`Expectation`] and the raw [`Outcome`] of a run into a
//! [`Verdict`]. This is a pure function: the same inputs always produce the
//! same verdict.
//!
//! Diagnostic patterns are checked as a set cover. Every pattern must match
//! somewhere in the diagnostic text on its own; patterns may overlap, order is
//! irrelevant, and every miss is reported rather than only the first.

pub mod diff;

use crate::directive::{DiagnosticPattern, Expectation, ExpectationKind};
use crate::driver::Outcome;
use crate::engine::EngineResult;
use std::fmt;

/// Which engine invocation a timeout belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reference,
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Reference => write!(f, "reference run"),
            Stage::Compile => write!(f, "compile step"),
            Stage::Run => write!(f, "artifact run"),
        }
    }
}

/// Why the system under test was judged wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// An engine exceeded the time limit
    Timeout(Stage),
    /// Compilation failed where it had to succeed
    CompileFailed,
    /// The compiled program exited non-zero
    NonZeroExit(i32),
    /// Output differs from the reference interpreter
    OutputMismatch,
    /// Compilation succeeded where it had to fail
    UnexpectedSuccess,
    /// Declared patterns, verbatim, that matched nowhere
    UnmatchedPatterns(Vec<String>),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Timeout(stage) => write!(f, "timeout in {}", stage),
            FailReason::CompileFailed => write!(f, "compilation failed"),
            FailReason::NonZeroExit(code) => write!(f, "program exited with code {}", code),
            FailReason::OutputMismatch => write!(f, "output differs from reference"),
            FailReason::UnexpectedSuccess => write!(f, "compilation unexpectedly succeeded"),
            FailReason::UnmatchedPatterns(patterns) => {
                write!(f, "unmatched pattern(s): {}", patterns.join(", "))
            }
        }
    }
}

/// Final classification of one test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The system under test misbehaved. `detail` holds the output diff or the
    /// diagnostic text the patterns were checked against.
    Fail { reason: FailReason, detail: String },
    /// The harness could not form a judgment
    Error(String),
    Skip(String),
}

impl Verdict {
    pub fn fail(reason: FailReason, detail: impl Into<String>) -> Self {
        Verdict::Fail {
            reason,
            detail: detail.into(),
        }
    }

    /// Short uppercase label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail { .. } => "FAIL",
            Verdict::Error(_) => "ERROR",
            Verdict::Skip(_) => "SKIP",
        }
    }

    /// Fail and Error both make the suite fail
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Fail { .. } | Verdict::Error(_))
    }

    /// One-line reason, empty for `Pass`
    pub fn reason(&self) -> String {
        match self {
            Verdict::Pass => String::new(),
            Verdict::Fail { reason, .. } => reason.to_string(),
            Verdict::Error(message) | Verdict::Skip(message) => message.clone(),
        }
    }

    /// Multi-line detail, empty when there is none
    pub fn detail(&self) -> &str {
        match self {
            Verdict::Fail { detail, .. } => detail,
            _ => "",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            _ => write!(f, "{}: {}", self.label(), self.reason()),
        }
    }
}

/// Judge `outcome` against `expectation`
pub fn match_outcome(expectation: &Expectation, outcome: &Outcome) -> Verdict {
    if let Some((stage, result)) = timed_out_stage(outcome) {
        return Verdict::fail(
            FailReason::Timeout(stage),
            format!("{} killed after {:?}", stage, result.duration),
        );
    }

    let compile = &outcome.subject.compile;
    match &expectation.kind {
        ExpectationKind::Ok => match_ok(expectation, outcome),
        ExpectationKind::ShouldFail { patterns } => {
            let text = diagnostic_text(compile);
            if compile.exit_code == 0 {
                Verdict::fail(FailReason::UnexpectedSuccess, text)
            } else {
                match_patterns(patterns, text)
            }
        }
        ExpectationKind::ShouldWarn { patterns } => {
            let text = diagnostic_text(compile);
            if !compile.success() {
                Verdict::fail(FailReason::CompileFailed, text)
            } else {
                match_patterns(patterns, text)
            }
        }
        ExpectationKind::RuntimeShouldWarn { patterns } => {
            if !compile.success() {
                return Verdict::fail(FailReason::CompileFailed, diagnostic_text(compile));
            }
            match &outcome.subject.run {
                Some(run) => match_patterns(patterns, diagnostic_text(run)),
                None => Verdict::Error(
                    "runtime diagnostics need an artifact run step, none is configured".to_string(),
                ),
            }
        }
    }
}

fn match_ok(expectation: &Expectation, outcome: &Outcome) -> Verdict {
    let compile = &outcome.subject.compile;
    let subject = outcome.subject.collapsed();

    let reference = match &outcome.reference {
        Some(reference) => reference,
        None if expectation.skips_reference() => {
            return if !compile.success() {
                Verdict::fail(FailReason::CompileFailed, diagnostic_text(compile))
            } else if subject.exit_code != 0 {
                Verdict::fail(FailReason::NonZeroExit(subject.exit_code), diagnostic_text(subject))
            } else {
                Verdict::Pass
            };
        }
        None => return Verdict::Error("reference run is missing for an `@ok` test".to_string()),
    };

    if reference.exit_code != 0 {
        return Verdict::Error(format!(
            "reference engine exited with code {}: {}",
            reference.exit_code,
            reference.stderr_string().trim_end()
        ));
    }
    if !compile.success() {
        return Verdict::fail(FailReason::CompileFailed, diagnostic_text(compile));
    }
    if subject.exit_code != 0 {
        return Verdict::fail(FailReason::NonZeroExit(subject.exit_code), diagnostic_text(subject));
    }

    let mut detail = String::new();
    for (stream, expected, actual) in [
        ("stdout", &reference.stdout, &subject.stdout),
        ("stderr", &reference.stderr, &subject.stderr),
    ] {
        let expected = trim_trailing_newlines(expected);
        let actual = trim_trailing_newlines(actual);
        if expected != actual {
            detail.push_str(&format!("--- reference {}\n+++ subject {}\n", stream, stream));
            detail.push_str(&diff::output_diff(expected, actual));
        }
    }
    if !detail.is_empty() && (reference.truncated || subject.truncated) {
        detail.push_str("(output truncated at the capture limit)\n");
    }

    if detail.is_empty() {
        Verdict::Pass
    } else {
        Verdict::fail(FailReason::OutputMismatch, detail)
    }
}

fn match_patterns(patterns: &[DiagnosticPattern], text: String) -> Verdict {
    let unmatched = unmatched_patterns(patterns, &text);
    if unmatched.is_empty() {
        Verdict::Pass
    } else {
        Verdict::fail(
            FailReason::UnmatchedPatterns(unmatched.iter().map(|p| p.to_string()).collect()),
            text,
        )
    }
}

/// Every pattern with no match anywhere in `text`, in declaration order
pub fn unmatched_patterns<'p>(patterns: &'p [DiagnosticPattern], text: &str) -> Vec<&'p DiagnosticPattern> {
    let mut unmatched = Vec::new();
    for pattern in patterns {
        if !pattern.is_match(text) {
            unmatched.push(pattern);
        }
    }
    unmatched
}

/// stdout followed by stderr, decoded lossily
pub fn diagnostic_text(result: &EngineResult) -> String {
    let mut combined = Vec::with_capacity(result.stdout.len() + result.stderr.len());
    combined.extend_from_slice(&result.stdout);
    combined.extend_from_slice(&result.stderr);
    String::from_utf8_lossy(&combined).into_owned()
}

/// Strip trailing `\n` bytes; nothing else is normalized, `\r` included
pub fn trim_trailing_newlines(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b'\n').map_or(0, |idx| idx + 1);
    &bytes[..end]
}

fn timed_out_stage(outcome: &Outcome) -> Option<(Stage, &EngineResult)> {
    let subject = &outcome.subject;
    [
        (Stage::Compile, Some(&subject.compile)),
        (Stage::Run, subject.run.as_ref()),
        (Stage::Reference, outcome.reference.as_ref()),
    ]
    .into_iter()
    .find_map(|(stage, result)| result.filter(|r| r.timed_out).map(|r| (stage, r)))
}
