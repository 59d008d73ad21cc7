//! Hygiene: coding standards for the diagram engine, checked at test time.
//!
//! The engine runs inside long-lived client sessions, where a panic drops the
//! whole view. Each rule below scans the production files under `src/` for a
//! set of patterns and holds the total to a budget. Budgets only ratchet down.

use std::fs;
use std::path::{Path, PathBuf};

struct Rule {
    name: &'static str,
    patterns: &'static [&'static str],
    budget: usize,
    hint: &'static str,
}

const RULES: &[Rule] = &[
    Rule { name: "unwrap", patterns: &[".unwrap()"], budget: 0, hint: "propagate or log the error" },
    Rule { name: "expect", patterns: &[".expect("], budget: 0, hint: "propagate or log the error" },
    Rule {
        name: "panic",
        patterns: &["panic!(", "unreachable!(", "todo!(", "unimplemented!("],
        budget: 0,
        hint: "return a typed error instead",
    },
    Rule { name: "discard", patterns: &["let _ =", ".ok()"], budget: 0, hint: "inspect the result" },
    Rule { name: "dead-code", patterns: &["#[allow(dead_code)]"], budget: 0, hint: "delete unused code" },
    Rule { name: "print", patterns: &["println!(", "eprintln!(", "dbg!("], budget: 0, hint: "use tracing" },
];

/// Production `.rs` files under `src/`, without `*_test.rs`.
fn production_files() -> Vec<(PathBuf, String)> {
    let mut out = Vec::new();
    walk(Path::new("src"), &mut out);
    out
}

fn walk(dir: &Path, out: &mut Vec<(PathBuf, String)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            walk(&path, out);
            continue;
        }
        let is_rs = path.extension().is_some_and(|e| e == "rs");
        let is_test = path.to_string_lossy().ends_with("_test.rs");
        if is_rs && !is_test {
            if let Ok(content) = fs::read_to_string(&path) {
                out.push((path, content));
            }
        }
    }
}

fn check(rule_name: &str) {
    let Some(rule) = RULES.iter().find(|r| r.name == rule_name) else {
        panic!("no hygiene rule named {rule_name}");
    };

    let mut hits = Vec::new();
    for (path, content) in production_files() {
        let count = content
            .lines()
            .filter(|line| rule.patterns.iter().any(|p| line.contains(p)))
            .count();
        if count > 0 {
            hits.push(format!("  {}: {count}", path.display()));
        }
    }
    let total: usize = hits
        .iter()
        .filter_map(|h| h.rsplit(": ").next()?.parse::<usize>().ok())
        .sum();

    assert!(
        total <= rule.budget,
        "{} budget exceeded ({total} > {}); {}.\n{}",
        rule.name,
        rule.budget,
        rule.hint,
        hits.join("\n")
    );
}

#[test]
fn unwrap_budget() {
    check("unwrap");
}

#[test]
fn expect_budget() {
    check("expect");
}

#[test]
fn panic_budget() {
    check("panic");
}

#[test]
fn discard_budget() {
    check("discard");
}

#[test]
fn dead_code_budget() {
    check("dead-code");
}

#[test]
fn print_budget() {
    check("print");
}

#[test]
fn sibling_test_files_exist() {
    let missing: Vec<String> = production_files()
        .iter()
        .flat_map(|(path, content)| {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            content
                .lines()
                .filter_map(|line| line.trim().strip_prefix("#[path = \"")?.strip_suffix("\"]"))
                .filter(|name| !dir.join(name).exists())
                .map(|name| format!("  {}: {name}", path.display()))
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(missing.is_empty(), "missing test files:\n{}", missing.join("\n"));
}
