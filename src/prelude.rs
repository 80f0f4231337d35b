//! Prelude module for convenient imports
//!
//! ```no_run
//! use phpt_difftest::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let expectation = directive::parse(b"@kphp_should_fail\n/undefined variable/\n<?php\n")?;
//!     assert_eq!(expectation.verdict_kind(), VerdictKind::ShouldFail);
//!     Ok(())
//! }
//! ```

// Error handling
pub use crate::error::{Error, Result};

// Directives
pub use crate::directive::{
    self, DiagnosticPattern, DirectiveError, Expectation, ExpectationKind, Modifiers, VerdictKind,
};

// Engines and the per-test driver
pub use crate::driver::{ArtifactRun, Driver, Outcome, SubjectPipeline, SubjectResult};
pub use crate::engine::{EngineResult, EngineRunner, EngineSpec, InputMode};

// Judging
pub use crate::matcher::{match_outcome, FailReason, Stage, Verdict};

// Orchestration
pub use crate::cancel::CancelToken;
pub use crate::config::HarnessConfig;
pub use crate::suite::{discover_tests, OutputFormat, Suite, SuiteReport, TestRecord};
pub use crate::testfile::TestFile;
