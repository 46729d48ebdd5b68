//! Hygiene budgets for the scene crate.
//!
//! Scans `src/` (excluding `*_test.rs`) for patterns that crash the renderer
//! mid-frame or hide failures. Each pattern has a budget; budgets only go down.

use std::fs;
use std::path::{Path, PathBuf};

const BUDGETS: &[(&str, usize)] = &[
    (".unwrap()", 0),
    (".expect(", 0),
    ("panic!(", 0),
    ("unreachable!(", 0),
    ("todo!(", 0),
    ("unimplemented!(", 0),
    ("let _ =", 0),
    (".ok()", 0),
    ("#[allow(dead_code)]", 0),
    // Frame output goes through tracing, never stdout.
    ("println!(", 0),
    ("eprintln!(", 0),
    ("dbg!(", 0),
];

fn production_sources(dir: &Path, out: &mut Vec<(PathBuf, String)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            production_sources(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs")
            && !path.to_string_lossy().ends_with("_test.rs")
        {
            if let Ok(content) = fs::read_to_string(&path) {
                out.push((path, content));
            }
        }
    }
}

#[test]
fn source_tree_is_not_empty() {
    let mut files = Vec::new();
    production_sources(Path::new("src"), &mut files);
    assert!(files.iter().any(|(p, _)| p.ends_with("traverser.rs")), "scan found no sources; wrong working dir?");
}

#[test]
fn pattern_budgets_hold() {
    let mut files = Vec::new();
    production_sources(Path::new("src"), &mut files);

    let mut failures = Vec::new();
    for &(pattern, budget) in BUDGETS {
        let hits: Vec<String> = files
            .iter()
            .filter_map(|(path, content)| {
                let n = content.lines().filter(|line| line.contains(pattern)).count();
                (n > 0).then(|| format!("  {}: {n}", path.display()))
            })
            .collect();
        let count: usize = files
            .iter()
            .map(|(_, content)| content.lines().filter(|line| line.contains(pattern)).count())
            .sum();
        if count > budget {
            failures.push(format!("`{pattern}` found {count}, budget {budget}\n{}", hits.join("\n")));
        }
    }
    assert!(failures.is_empty(), "hygiene budgets exceeded:\n{}", failures.join("\n"));
}
