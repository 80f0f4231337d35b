//! Line-level diff for output mismatch reports

use std::fmt::Write;

/// Unchanged lines shown around a change
const CONTEXT: usize = 3;

/// Above this many LCS cells the middle section is reported as a block
/// replacement instead of an exact diff
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

/// Edit script turning `old` into `new`, line by line
pub fn diff_lines<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<DiffLine<'a>> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut lines: Vec<DiffLine<'a>> = old[..prefix].iter().copied().map(DiffLine::Same).collect();
    if old_mid.len().saturating_mul(new_mid.len()) <= MAX_LCS_CELLS {
        lcs_script(old_mid, new_mid, &mut lines);
    } else {
        lines.extend(old_mid.iter().copied().map(DiffLine::Removed));
        lines.extend(new_mid.iter().copied().map(DiffLine::Added));
    }
    lines.extend(old[old.len() - suffix..].iter().copied().map(DiffLine::Same));
    lines
}

fn lcs_script<'a>(old: &[&'a str], new: &[&'a str], out: &mut Vec<DiffLine<'a>>) {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            out.push(DiffLine::Same(old[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            out.push(DiffLine::Removed(old[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(new[j]));
            j += 1;
        }
    }
    out.extend(old[i..].iter().copied().map(DiffLine::Removed));
    out.extend(new[j..].iter().copied().map(DiffLine::Added));
}

/// Render a diff of `expected` (reference) against `actual` (subject) with
/// `-`/`+` markers, eliding unchanged runs longer than the context window
pub fn line_diff(expected: &str, actual: &str) -> String {
    let old: Vec<&str> = expected.lines().collect();
    let new: Vec<&str> = actual.lines().collect();
    let script = diff_lines(&old, &new);

    let changed: Vec<usize> = script
        .iter()
        .enumerate()
        .filter(|(_, line)| !matches!(line, DiffLine::Same(_)))
        .map(|(idx, _)| idx)
        .collect();

    let near_change = |idx: usize| {
        changed
            .iter()
            .any(|&c| idx + CONTEXT >= c && idx <= c + CONTEXT)
    };

    let mut out = String::new();
    let mut elided = 0usize;
    for (idx, line) in script.iter().enumerate() {
        match line {
            DiffLine::Same(text) if near_change(idx) => {
                flush_elided(&mut out, &mut elided);
                let _ = writeln!(out, "  {}", text);
            }
            DiffLine::Same(_) => elided += 1,
            DiffLine::Removed(text) => {
                flush_elided(&mut out, &mut elided);
                let _ = writeln!(out, "- {}", text);
            }
            DiffLine::Added(text) => {
                flush_elided(&mut out, &mut elided);
                let _ = writeln!(out, "+ {}", text);
            }
        }
    }
    flush_elided(&mut out, &mut elided);
    out
}

/// Diff of two raw output streams. When decoding or line splitting hides the
/// difference (`\r`, invalid UTF-8), both streams are shown as escaped bytes.
pub fn output_diff(expected: &[u8], actual: &[u8]) -> String {
    let rendered = line_diff(
        &String::from_utf8_lossy(expected),
        &String::from_utf8_lossy(actual),
    );
    if rendered.lines().any(|line| line.starts_with('-') || line.starts_with('+')) {
        return rendered;
    }
    format!(
        "  (no visible line difference, raw bytes follow)\n- b\"{}\"\n+ b\"{}\"\n",
        expected.escape_ascii(),
        actual.escape_ascii()
    )
}

fn flush_elided(out: &mut String, elided: &mut usize) {
    if *elided > 0 {
        let _ = writeln!(out, "  ... {} unchanged line(s)", elided);
        *elided = 0;
    }
}
