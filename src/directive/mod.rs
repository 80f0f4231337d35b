//! Directive block parser
//!
//! Every test script opens with a small header that declares what the harness
//! should expect from it:
//!
//! ```text
//! @kphp_should_fail
//! /but bool type is passed/
//! /but int\[\] type is passed/
//! <?php
//! ...
//! ```
//!
//! The first line carries the tag and optional modifiers, the following lines
//! carry `/`-delimited regular expressions, and the block ends at a blank line
//! or at the `<?php` marker. Parsing is all-or-nothing: a file either yields a
//! complete [`Expectation`] or a [`DirectiveError`].

use bitflags::bitflags;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Marker that opens the script body; everything before it is the header
pub const LANGUAGE_MARKER: &[u8] = b"<?php";

/// Directive block rejection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("directive block is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing directive tag on the first line")]
    MissingDirective,

    #[error("unknown directive `{0}`")]
    UnknownDirective(String),

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),

    #[error("line {line}: malformed pattern `{text}`: {problem}")]
    MalformedPattern {
        line: usize,
        text: String,
        problem: &'static str,
    },

    #[error("line {line}: `{pattern}` is not a valid regular expression: {message}")]
    InvalidPattern {
        line: usize,
        pattern: String,
        message: String,
    },

    #[error("line {line}: pattern appears after the end of the directive block")]
    PatternsOutOfOrder { line: usize },

    #[error("`@ok` test declares {0} diagnostic pattern(s)")]
    PatternsOnOkTest(usize),
}

/// Expected verdict class, one per registered directive tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VerdictKind {
    /// Compile, run and compare output with the reference interpreter
    Ok,
    /// Compilation must fail with the declared diagnostics
    ShouldFail,
    /// Compilation must succeed while emitting the declared diagnostics
    ShouldWarn,
    /// The compiled artifact must emit the declared diagnostics when run
    RuntimeShouldWarn,
}

impl VerdictKind {
    /// All registered kinds, in tag-table order
    pub const ALL: [VerdictKind; 4] = [
        VerdictKind::Ok,
        VerdictKind::ShouldFail,
        VerdictKind::ShouldWarn,
        VerdictKind::RuntimeShouldWarn,
    ];

    /// The directive tag spelling
    pub fn tag(self) -> &'static str {
        match self {
            VerdictKind::Ok => "@ok",
            VerdictKind::ShouldFail => "@kphp_should_fail",
            VerdictKind::ShouldWarn => "@kphp_should_warn",
            VerdictKind::RuntimeShouldWarn => "@kphp_runtime_should_warn",
        }
    }

    /// Look up a tag token
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

bitflags! {
    /// Execution modifiers that follow the tag on the first line
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Do not run the reference interpreter
        const NO_PHP = 1 << 0;
        /// Long-running test
        const BENCHMARK = 1 << 1;
        /// Requires PHP 7.4 semantics from the reference
        const PHP7_4 = 1 << 2;
        /// Requires PHP 8 semantics from the reference
        const PHP8 = 1 << 3;
        /// Not supported by the K2 runtime
        const K2_SKIP = 1 << 4;
    }
}

const MODIFIER_TOKENS: &[(&str, Modifiers)] = &[
    ("no_php", Modifiers::NO_PHP),
    ("benchmark", Modifiers::BENCHMARK),
    ("php7_4", Modifiers::PHP7_4),
    ("php8", Modifiers::PHP8),
    ("k2_skip", Modifiers::K2_SKIP),
];

impl Modifiers {
    /// Look up a single modifier token
    pub fn from_token(token: &str) -> Option<Self> {
        MODIFIER_TOKENS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, flag)| *flag)
    }

    /// Token spellings of the flags in this set
    pub fn tokens(self) -> Vec<&'static str> {
        MODIFIER_TOKENS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// One `/.../` line, compiled
#[derive(Debug, Clone)]
pub struct DiagnosticPattern {
    source: String,
    regex: Regex,
}

impl DiagnosticPattern {
    /// The pattern body exactly as written between the delimiters
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the pattern matches anywhere in `text`
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Display for DiagnosticPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

impl PartialEq for DiagnosticPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Expected behavior, by kind. Only the diagnostic kinds carry patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectationKind {
    Ok,
    ShouldFail { patterns: Vec<DiagnosticPattern> },
    ShouldWarn { patterns: Vec<DiagnosticPattern> },
    RuntimeShouldWarn { patterns: Vec<DiagnosticPattern> },
}

/// Parsed directive block of a single test
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub kind: ExpectationKind,
    pub modifiers: Modifiers,
}

impl Expectation {
    pub fn verdict_kind(&self) -> VerdictKind {
        match self.kind {
            ExpectationKind::Ok => VerdictKind::Ok,
            ExpectationKind::ShouldFail { .. } => VerdictKind::ShouldFail,
            ExpectationKind::ShouldWarn { .. } => VerdictKind::ShouldWarn,
            ExpectationKind::RuntimeShouldWarn { .. } => VerdictKind::RuntimeShouldWarn,
        }
    }

    /// Declared diagnostic patterns (empty for `@ok`)
    pub fn patterns(&self) -> &[DiagnosticPattern] {
        match &self.kind {
            ExpectationKind::Ok => &[],
            ExpectationKind::ShouldFail { patterns }
            | ExpectationKind::ShouldWarn { patterns }
            | ExpectationKind::RuntimeShouldWarn { patterns } => patterns,
        }
    }

    pub fn skips_reference(&self) -> bool {
        self.modifiers.contains(Modifiers::NO_PHP)
    }
}

/// Parse the directive block at the top of a test file
pub fn parse(source: &[u8]) -> Result<Expectation, DirectiveError> {
    let header = std::str::from_utf8(split_header(source)).map_err(|_| DirectiveError::InvalidUtf8)?;
    let mut lines = header.lines().enumerate();

    let first = lines.next().map(|(_, line)| line.trim()).unwrap_or("");
    let mut tokens = first.split_whitespace();
    let tag = tokens.next().ok_or(DirectiveError::MissingDirective)?;
    let kind = VerdictKind::from_tag(tag)
        .ok_or_else(|| DirectiveError::UnknownDirective(tag.to_string()))?;

    let mut modifiers = Modifiers::empty();
    for token in tokens {
        modifiers |= Modifiers::from_token(token)
            .ok_or_else(|| DirectiveError::UnknownModifier(token.to_string()))?;
    }

    let mut patterns = Vec::new();
    let mut block_open = true;
    for (idx, raw) in lines {
        let line_no = idx + 1;
        let line = raw.trim();
        if !line.starts_with('/') {
            // blank line or free text closes the block
            block_open = false;
            continue;
        }
        if !block_open {
            return Err(DirectiveError::PatternsOutOfOrder { line: line_no });
        }
        patterns.push(parse_pattern(line, line_no)?);
    }

    let kind = match kind {
        VerdictKind::Ok if !patterns.is_empty() => {
            return Err(DirectiveError::PatternsOnOkTest(patterns.len()))
        }
        VerdictKind::Ok => ExpectationKind::Ok,
        VerdictKind::ShouldFail => ExpectationKind::ShouldFail { patterns },
        VerdictKind::ShouldWarn => ExpectationKind::ShouldWarn { patterns },
        VerdictKind::RuntimeShouldWarn => ExpectationKind::RuntimeShouldWarn { patterns },
    };

    Ok(Expectation { kind, modifiers })
}

fn split_header(source: &[u8]) -> &[u8] {
    source
        .windows(LANGUAGE_MARKER.len())
        .position(|window| window == LANGUAGE_MARKER)
        .map_or(source, |pos| &source[..pos])
}

/// Parse one `/body/` line. `\/` is an escaped delimiter, every other escape is
/// passed through to the regex engine untouched.
fn parse_pattern(line: &str, line_no: usize) -> Result<DiagnosticPattern, DirectiveError> {
    let malformed = |problem| DirectiveError::MalformedPattern {
        line: line_no,
        text: line.to_string(),
        problem,
    };

    let inner = &line[1..];
    let mut body = String::with_capacity(inner.len());
    let mut escaped = false;
    let mut end = None;

    for (i, c) in inner.char_indices() {
        if escaped {
            if c != '/' {
                body.push('\\');
            }
            body.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '/' => {
                end = Some(i);
                break;
            }
            _ => body.push(c),
        }
    }

    let end = end.ok_or_else(|| malformed("missing closing `/`"))?;
    if !inner[end + 1..].trim().is_empty() {
        return Err(malformed("unescaped `/` inside pattern"));
    }
    if body.is_empty() {
        return Err(malformed("empty pattern"));
    }

    let regex = Regex::new(&body).map_err(|e| DirectiveError::InvalidPattern {
        line: line_no,
        pattern: inner[..end].to_string(),
        message: e.to_string(),
    })?;

    Ok(DiagnosticPattern {
        source: inner[..end].to_string(),
        regex,
    })
}
