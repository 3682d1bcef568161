//! Hygiene: source-level budgets for the tabletop crate.
//!
//! Scans production sources under `src/` (sibling `*_test.rs` files are
//! skipped) for patterns that crash the process, swallow errors, or bypass
//! `tracing`. Budgets only ever go down.
#![allow(clippy::absurd_extreme_comparisons)]

use std::fs;
use std::path::Path;

struct Budget {
    pattern: &'static str,
    max: usize,
    why: &'static str,
}

// Panics.
const UNWRAP: Budget = Budget { pattern: ".unwrap()", max: 0, why: "propagate with ? or handle" };
const EXPECT: Budget = Budget { pattern: ".expect(", max: 0, why: "propagate with ? or handle" };
const PANIC: Budget = Budget { pattern: "panic!(", max: 0, why: "return an error value" };
const UNREACHABLE: Budget = Budget { pattern: "unreachable!(", max: 0, why: "restructure the match" };
const TODO: Budget = Budget { pattern: "todo!(", max: 0, why: "finish the stub" };
const UNIMPLEMENTED: Budget = Budget { pattern: "unimplemented!(", max: 0, why: "finish the stub" };

// Silent loss.
const SILENT_DISCARD: Budget = Budget { pattern: "let _ =", max: 0, why: "log or propagate the error" };
const DOT_OK: Budget = Budget { pattern: ".ok()", max: 0, why: "log or propagate the error" };

// Output goes through tracing.
const PRINTLN: Budget = Budget { pattern: "println!(", max: 0, why: "use tracing" };
const EPRINTLN: Budget = Budget { pattern: "eprintln!(", max: 0, why: "use tracing" };

const ALLOW_DEAD_CODE: Budget = Budget { pattern: "#[allow(dead_code)]", max: 0, why: "delete the code" };

struct SourceFile {
    path: String,
    content: String,
}

fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect(Path::new("src"), &mut files);
    files
}

fn collect(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, out);
            continue;
        }
        let path_str = path.to_string_lossy().to_string();
        if !path_str.ends_with(".rs") || path_str.ends_with("_test.rs") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path) {
            out.push(SourceFile { path: path_str, content });
        }
    }
}

fn enforce(budget: &Budget) {
    let hits: Vec<(String, usize)> = source_files()
        .into_iter()
        .filter_map(|file| {
            let count = file.content.lines().filter(|line| line.contains(budget.pattern)).count();
            (count > 0).then_some((file.path, count))
        })
        .collect();
    let total: usize = hits.iter().map(|(_, c)| c).sum();
    let listing = hits.iter().map(|(p, c)| format!("  {p}: {c}")).collect::<Vec<_>>().join("\n");
    assert!(
        total <= budget.max,
        "`{}` budget exceeded: found {total}, max {} ({}).\n{listing}",
        budget.pattern,
        budget.max,
        budget.why,
    );
}

#[test]
fn sources_are_found() {
    assert!(source_files().iter().any(|f| f.path.ends_with("engine.rs")));
}

#[test]
fn unwrap_budget() {
    enforce(&UNWRAP);
}

#[test]
fn expect_budget() {
    enforce(&EXPECT);
}

#[test]
fn panic_budget() {
    enforce(&PANIC);
}

#[test]
fn unreachable_budget() {
    enforce(&UNREACHABLE);
}

#[test]
fn todo_budget() {
    enforce(&TODO);
}

#[test]
fn unimplemented_budget() {
    enforce(&UNIMPLEMENTED);
}

#[test]
fn silent_discard_budget() {
    enforce(&SILENT_DISCARD);
}

#[test]
fn dot_ok_budget() {
    enforce(&DOT_OK);
}

#[test]
fn print_budget() {
    enforce(&PRINTLN);
    enforce(&EPRINTLN);
}

#[test]
fn allow_dead_code_budget() {
    enforce(&ALLOW_DEAD_CODE);
}
