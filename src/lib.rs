//! phpt-difftest: a differential test harness for directive-annotated PHP scripts
//!
//! Every test script carries a short header before `<?php` declaring what
//! should happen when it is processed: the program runs and behaves exactly
//! like the reference interpreter (`@ok`), compilation is rejected
//! (`@kphp_should_fail`), compilation emits a warning (`@kphp_should_warn`) or
//! the compiled program warns at run time (`@kphp_runtime_should_warn`).
//! Expected diagnostics are listed as `/regex/` lines under the tag.
//!
//! # Quick Start
//!
//! ```no_run
//! use phpt_difftest::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = HarnessConfig::load("difftest.toml".as_ref())?;
//!     let suite = Suite::new(config, CancelToken::new())?;
//!     let report = suite.run()?;
//!     println!("{}", report.render(OutputFormat::Summary));
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! # Module Overview
//!
//! A test flows: [`testfile`] → [`directive`] → [`driver`] (via [`engine`]) → [`matcher`] → [`suite`] report
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Input** | [`testfile`], [`directive`] |
//! | **Execution** | [`engine`], [`driver`], [`cancel`] |
//! | **Judging** | [`matcher`] |
//! | **Orchestration** | [`suite`], [`config`], [`error`](Error) |

pub mod cancel;
pub mod config;
pub mod directive;
pub mod driver;
pub mod engine;
pub mod matcher;
pub mod prelude;
pub mod suite;
pub mod testfile;

mod error;

pub use error::{Error, Result};
pub use suite::{Suite, SuiteReport};

/// phpt-difftest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
