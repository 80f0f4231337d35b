//! End-to-end suite runs against the fake toolchain
#![cfg(unix)]

mod common;
use common::{write_test, FakeToolchain};
use phpt_difftest::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

const INHERITANCE_OK: &str = "@ok\n<?php\necho B::foo 1\necho C::foo 2\n";

const WRONG_INDEX_TYPE: &str = "@kphp_should_fail\n\
    /but bool type is passed/\n\
    /but int\\[\\] type is passed/\n\
    /but Foo type is passed/\n\
    /but \\?string type is passed/\n\
    /but string\\|false type is passed/\n\
    <?php\n\
    error pass bool to argument $index of array access, but bool type is passed\n\
    error pass int[] to argument $index of array access, but int[] type is passed\n\
    error pass Foo to argument $index of array access, but Foo type is passed\n\
    error pass ?string to argument $index of array access, but ?string type is passed\n\
    error pass string|false to argument $index of array access, but string|false type is passed\n";

fn records_by_name(report: &SuiteReport) -> Vec<(&str, &'static str)> {
    report
        .records
        .iter()
        .map(|r| (r.name.as_str(), r.verdict.label()))
        .collect()
}

fn mixed_tree(root: &Path) {
    write_test(root, "class_inheritance/013_inheritance_and_implements.php", INHERITANCE_OK);
    write_test(root, "array/016_array_indexing_wrong_index_type.php", WRONG_INDEX_TYPE);
    // one pattern the compiler never reports
    write_test(
        root,
        "array/018_array_indexing_string.php",
        &WRONG_INDEX_TYPE.replace("<?php\n", "/but string type is passed/\n<?php\n"),
    );
    write_test(root, "dl/964_try.php", "@ok no_php\n<?php\nbug message: Test1\n");
    write_test(root, "dl/notes.txt", "not a test");
}

#[test]
fn test_mixed_suite_report() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    mixed_tree(tree.path());

    let suite = Suite::new(toolchain.config(tree.path()), CancelToken::new()).unwrap();
    let report = suite.run().unwrap();

    assert_eq!(
        records_by_name(&report),
        vec![
            ("array/016_array_indexing_wrong_index_type.php", "PASS"),
            ("array/018_array_indexing_string.php", "FAIL"),
            ("class_inheritance/013_inheritance_and_implements.php", "PASS"),
            ("dl/964_try.php", "PASS"),
        ]
    );
    assert_eq!((report.total, report.passed, report.failed), (4, 3, 1));
    assert_eq!(report.exit_code(), 1);

    let failing = report.failing_tests();
    assert_eq!(
        failing[0].verdict.reason(),
        "unmatched pattern(s): /but string type is passed/"
    );
    assert_eq!(report.directories["array"].failed, 1);
    assert_eq!(report.directories["dl"].passed, 1);
}

#[test]
fn test_all_green_suite_exits_zero() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    write_test(tree.path(), "a/001.php", INHERITANCE_OK);
    write_test(tree.path(), "a/002.php", WRONG_INDEX_TYPE);

    let report = Suite::new(toolchain.config(tree.path()), CancelToken::new())
        .unwrap()
        .run()
        .unwrap();
    assert!(report.success());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_ordering_is_deterministic() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    mixed_tree(tree.path());

    let mut config = toolchain.config(tree.path());
    config.jobs = 4;
    let suite = Suite::new(config, CancelToken::new()).unwrap();
    let first = suite.run().unwrap();
    let second = suite.run().unwrap();

    assert_eq!(records_by_name(&first), records_by_name(&second));
    assert_eq!(
        first.render(OutputFormat::Tap).lines().count(),
        second.render(OutputFormat::Tap).lines().count()
    );
}

#[test]
fn test_malformed_directive_is_error_not_abort() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    write_test(tree.path(), "bad/001_unknown_tag.php", "@kphp_should_explode\n<?php\n");
    write_test(tree.path(), "bad/002_no_directive.php", "<?php\necho hi\n");
    write_test(tree.path(), "good/001.php", INHERITANCE_OK);

    let report = Suite::new(toolchain.config(tree.path()), CancelToken::new())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(
        records_by_name(&report),
        vec![
            ("bad/001_unknown_tag.php", "ERROR"),
            ("bad/002_no_directive.php", "ERROR"),
            ("good/001.php", "PASS"),
        ]
    );
    assert!(report.records[0].verdict.reason().contains("directive error"));
    assert!(report.records[0].kind.is_none());
}

#[test]
fn test_skip_modifiers() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    write_test(tree.path(), "perf/001.php", "@ok benchmark\n<?php\nhang\n");
    write_test(tree.path(), "perf/002.php", INHERITANCE_OK);

    let mut config = toolchain.config(tree.path());
    config.skip_modifiers = vec!["benchmark".to_string()];
    let report = Suite::new(config, CancelToken::new()).unwrap().run().unwrap();

    assert_eq!(
        records_by_name(&report),
        vec![("perf/001.php", "SKIP"), ("perf/002.php", "PASS")]
    );
    assert!(report.success());
}

#[test]
fn test_cancelled_suite_reports_errors() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    mixed_tree(tree.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let report = Suite::new(toolchain.config(tree.path()), cancel).unwrap().run().unwrap();

    assert!(report.cancelled);
    assert_eq!(report.errors, 4);
    assert!(report.records.iter().all(|r| r.verdict == Verdict::Error("cancelled".to_string())));
    assert!(!toolchain.reference_ran());
    assert_eq!(report.exit_code(), 1);
}

/// Running and not a zombie
#[cfg(target_os = "linux")]
fn process_alive(pid: i32) -> bool {
    fs::read_to_string(format!("/proc/{}/stat", pid))
        .map(|stat| {
            // state follows the parenthesised command name
            stat.rsplit_once(')')
                .map_or(true, |(_, rest)| !rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
#[test]
fn test_cancel_during_engine_run_kills_process_tree() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    write_test(tree.path(), "slow/001_hang.php", "@ok no_php\n<?php\nhang\n");

    let mut config = toolchain.config(tree.path());
    config.timeout = Duration::from_secs(60);
    let cancel = CancelToken::new();
    let suite = Suite::new(config, cancel.clone()).unwrap();

    let started = Instant::now();
    let report = thread::scope(|scope| {
        let trigger = scope.spawn(|| {
            while toolchain.hang_pid().is_none() && started.elapsed() < Duration::from_secs(20) {
                thread::sleep(Duration::from_millis(20));
            }
            cancel.cancel();
        });
        let report = suite.run().unwrap();
        trigger.join().unwrap();
        report
    });

    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(report.cancelled);
    assert_eq!(report.records[0].verdict, Verdict::Error("cancelled".to_string()));
    assert_eq!(report.exit_code(), 1);

    let sleeper = toolchain.hang_pid().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while process_alive(sleeper) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(!process_alive(sleeper), "pid {} survived cancellation", sleeper);
}

#[test]
fn test_empty_tree_is_fatal() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    write_test(tree.path(), "docs/readme.txt", "nothing here");

    let err = Suite::new(toolchain.config(tree.path()), CancelToken::new())
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::NoTestsDiscovered(_)));
}

#[test]
fn test_missing_root_is_fatal() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    let err = Suite::new(toolchain.config(&tree.path().join("missing")), CancelToken::new())
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, Error::RootNotFound(_)));
}

#[test]
fn test_single_file_root() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    let path = write_test(tree.path(), "dl/964_try.php", "@ok no_php\n<?php\necho x\n");

    let report = Suite::new(toolchain.config(&path), CancelToken::new())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(records_by_name(&report), vec![("964_try.php", "PASS")]);
}

#[test]
fn test_json_report_shape() {
    let toolchain = FakeToolchain::new();
    let tree = tempfile::tempdir().unwrap();
    mixed_tree(tree.path());

    let report = Suite::new(toolchain.config(tree.path()), CancelToken::new())
        .unwrap()
        .run()
        .unwrap();
    let json = report.to_json();
    assert_eq!(json["total"], 4);
    assert_eq!(json["tests"][0]["kind"], "@kphp_should_fail");

    let out = tree.path().join("report.json");
    fs::write(&out, serde_json::to_string_pretty(&json).unwrap()).unwrap();
    let back: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(back["failed"], 1);
}
