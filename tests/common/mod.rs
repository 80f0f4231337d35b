//! Shared test helpers for integration tests
//!
//! The fake toolchain is a pair of shell scripts driven by markers in the
//! test body:
//!
//! - `echo TEXT`: both engines print TEXT
//! - `bug TEXT`: only the compiled program prints TEXT
//! - `error TEXT` / `warn TEXT`: compiler diagnostics; any `error` fails the build
//! - `rtwarn TEXT`: the compiled program prints TEXT to stderr
//! - `crash`: the compiled program exits 2
//! - `hang` / `refhang`: the compiler / reference sleeps; the compiler records
//!   the sleeper's pid in `hang.pid`
//! - `refbroken`: the reference exits 255
//! - `nobuild`: the compiler succeeds without writing an artifact
//!
//! Scripts are passed to `/bin/sh` rather than executed directly, which avoids
//! ETXTBSY races with files still open for writing.

#![allow(dead_code)]

use phpt_difftest::config::HarnessConfig;
use phpt_difftest::driver::{ArtifactRun, SubjectPipeline};
use phpt_difftest::engine::EngineSpec;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const REFERENCE_SCRIPT: &str = r#"touch "$1"
src="$2"
if grep -q '^refhang' "$src"; then sleep 30; fi
if grep -q '^refbroken' "$src"; then echo 'PHP Parse error' >&2; exit 255; fi
sed -n 's/^echo //p' "$src"
"#;

const COMPILER_SCRIPT: &str = r#"out="$2"
src="$3"
if grep -q '^hang' "$src"; then
    sleep 30 &
    echo $! > "$(dirname "$0")/hang.pid"
    wait
fi
grep '^warn ' "$src" | sed 's/^warn //' >&2
if grep -q '^error ' "$src"; then
    grep '^error ' "$src" | sed 's/^error //' >&2
    exit 1
fi
if grep -q '^nobuild' "$src"; then exit 0; fi
{
    sed -n "s/^echo \(.*\)/echo '\1'/p; s/^bug \(.*\)/echo '\1'/p" "$src"
    sed -n "s/^rtwarn \(.*\)/echo '\1' >\&2/p" "$src"
    if grep -q '^crash' "$src"; then echo 'exit 2'; fi
} > "$out"
"#;

/// Reference interpreter and compiler stand-ins living in a temp directory
pub struct FakeToolchain {
    dir: TempDir,
}

impl FakeToolchain {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("reference.sh"), REFERENCE_SCRIPT).unwrap();
        fs::write(dir.path().join("compiler.sh"), COMPILER_SCRIPT).unwrap();
        Self { dir }
    }

    /// Created by the reference engine every time it runs
    pub fn marker(&self) -> PathBuf {
        self.dir.path().join("reference-ran")
    }

    pub fn reference_ran(&self) -> bool {
        self.marker().exists()
    }

    /// Pid of the process a hanging compile left sleeping, once it started
    pub fn hang_pid(&self) -> Option<i32> {
        fs::read_to_string(self.dir.path().join("hang.pid"))
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }

    pub fn reference(&self) -> EngineSpec {
        let script = self.dir.path().join("reference.sh");
        EngineSpec::new("/bin/sh").with_args([
            script.to_string_lossy().into_owned(),
            self.marker().to_string_lossy().into_owned(),
            "{input}".to_string(),
        ])
    }

    pub fn subject(&self) -> SubjectPipeline {
        let script = self.dir.path().join("compiler.sh");
        SubjectPipeline {
            compile: EngineSpec::new("/bin/sh").with_args([
                script.to_string_lossy().into_owned(),
                "-o".to_string(),
                "{output}".to_string(),
                "{input}".to_string(),
            ]),
            run: Some(ArtifactRun {
                launcher: Some(PathBuf::from("/bin/sh")),
                ..Default::default()
            }),
        }
    }

    pub fn config(&self, root: &Path) -> HarnessConfig {
        HarnessConfig {
            root: root.to_path_buf(),
            jobs: 2,
            timeout: Duration::from_secs(10),
            reference: self.reference(),
            subject: self.subject(),
            ..Default::default()
        }
    }
}

/// Write a test file under `root`, creating directories as needed
pub fn write_test(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}
