//! Hygiene — enforces coding standards at test time.
//!
//! Scans the crate's production sources for antipatterns. Every pattern
//! has a budget of zero; if one must be introduced, an existing one has
//! to be removed first — the budget never grows.

use std::fs;
use std::path::Path;

/// (needle, budget, why it is banned)
const BUDGETS: &[(&str, usize, &str)] = &[
    // Panics crash every collaborator's session at once.
    (".unwrap()", 0, "panics in production code"),
    (".expect(", 0, "panics in production code"),
    ("panic!(", 0, "panics in production code"),
    ("unreachable!(", 0, "panics in production code"),
    ("todo!(", 0, "unfinished code path"),
    ("unimplemented!(", 0, "unfinished code path"),
    // Silent loss hides delivery and reconciliation failures.
    ("let _ =", 0, "discards a result without inspecting it"),
    (".ok()", 0, "discards an error without inspecting it"),
    // Structure.
    ("#[allow(dead_code)]", 0, "dead code should be removed, not silenced"),
];

struct SourceFile {
    path: String,
    content: String,
}

/// Collect production `.rs` files from `src/`, excluding `*_test.rs`.
fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect_rs_files(Path::new("src"), &mut files);
    assert!(!files.is_empty(), "expected production sources under src/");
    files
}

fn collect_rs_files(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs") {
            let path_str = path.to_string_lossy().to_string();
            if path_str.ends_with("_test.rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path) {
                out.push(SourceFile { path: path_str, content });
            }
        }
    }
}

fn hits_for(files: &[SourceFile], needle: &str) -> Vec<(String, usize)> {
    files
        .iter()
        .filter_map(|file| {
            let count = file
                .content
                .lines()
                .filter(|line| line.contains(needle))
                .count();
            (count > 0).then(|| (file.path.clone(), count))
        })
        .collect()
}

#[test]
fn pattern_budgets_hold() {
    let files = source_files();
    let mut failures = Vec::new();

    for (needle, budget, reason) in BUDGETS {
        let hits = hits_for(&files, needle);
        let total: usize = hits.iter().map(|(_, c)| c).sum();
        if total > *budget {
            let detail = hits
                .iter()
                .map(|(path, count)| format!("  {path}: {count}"))
                .collect::<Vec<_>>()
                .join("\n");
            failures.push(format!(
                "`{needle}` budget exceeded ({total} > {budget}; {reason}):\n{detail}"
            ));
        }
    }

    assert!(failures.is_empty(), "\n{}", failures.join("\n"));
}
