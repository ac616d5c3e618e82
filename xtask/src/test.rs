//! xtask test - run the workspace's test suites one by one
//!
//! Each suite is one cargo invocation. Cargo prints a `test result:` line
//! per test binary; the counts of every line are added up so a suite that
//! spans several crates reports one total.

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// `#[cfg(test)]` modules of every crate.
    Unit,
    /// Binaries under `crates/*/tests`.
    Integration,
    /// proptest binaries.
    Property,
    /// Examples in doc comments.
    Doc,
}

struct Suite {
    label: &'static str,
    kind: Kind,
    args: &'static [&'static str],
}

const SUITES: [Suite; 7] = [
    Suite {
        label: "unit, all crates",
        kind: Kind::Unit,
        args: &["test", "--lib", "--workspace", "--features", "firmware/std"],
    },
    Suite {
        label: "wake-cycle scenarios",
        kind: Kind::Integration,
        args: &["test", "-p", "firmware", "--test", "wake_cycle"],
    },
    Suite {
        label: "crate and task boundaries",
        kind: Kind::Integration,
        args: &["test", "-p", "firmware", "--test", "arch_boundaries"],
    },
    Suite {
        label: "manifest walk",
        kind: Kind::Integration,
        args: &["test", "-p", "bluetooth", "--test", "manifest"],
    },
    Suite {
        label: "sleep, watchdog and storage properties",
        kind: Kind::Property,
        args: &["test", "-p", "firmware", "--test", "properties"],
    },
    Suite {
        label: "checksum properties",
        kind: Kind::Property,
        args: &["test", "-p", "bluetooth", "--test", "checksum_proptest"],
    },
    Suite {
        label: "doc examples",
        kind: Kind::Doc,
        args: &["test", "--doc", "--workspace"],
    },
];

/// Counts summed over every `test result:` line of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    binaries: u32,
    passed: u32,
    failed: u32,
    ignored: u32,
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} passed", self.passed)?;
        if self.ignored > 0 {
            write!(f, ", {} ignored", self.ignored)?;
        }
        write!(f, " in {} binaries", self.binaries)
    }
}

/// Add up `test result: ok. 5 passed; 0 failed; 1 ignored; ...` lines.
/// `None` when the output holds no result line at all (build failure).
fn tally(output: &str) -> Option<Tally> {
    let mut total = Tally::default();
    for line in output.lines() {
        let Some((_, counts)) = line.split_once("test result:") else {
            continue;
        };
        total.binaries = total.binaries.saturating_add(1);
        for part in counts.split(';') {
            let mut words = part.split_whitespace().rev();
            let (Some(what), Some(n)) = (words.next(), words.next()) else {
                continue;
            };
            let Ok(n) = n.parse::<u32>() else {
                continue;
            };
            match what {
                "passed" => total.passed = total.passed.saturating_add(n),
                "failed" => total.failed = total.failed.saturating_add(n),
                "ignored" => total.ignored = total.ignored.saturating_add(n),
                _ => {}
            }
        }
    }
    (total.binaries > 0).then_some(total)
}

fn selected(kind: Kind, unit_only: bool, integration_only: bool) -> bool {
    match (unit_only, integration_only) {
        (true, false) => kind == Kind::Unit,
        (false, true) => matches!(kind, Kind::Integration | Kind::Property),
        _ => true,
    }
}

fn run_suite(suite: &Suite, cases: Option<u32>) -> Result<Tally> {
    println!("{}", format!("  Running {}...", suite.label).cyan());
    let start = Instant::now();

    let mut cmd = Command::new("cargo");
    cmd.args(suite.args);
    if let (Kind::Property, Some(cases)) = (suite.kind, cases) {
        cmd.env("PROPTEST_CASES", cases.to_string());
    }
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run {}", suite.label))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let counts = tally(&stdout);

    if !output.status.success() {
        if suite.kind == Kind::Doc {
            eprintln!("{}", "  ⚠ Doc examples failed (not fatal)".yellow().bold());
            println!();
            return Ok(counts.unwrap_or_default());
        }
        eprintln!("{}", format!("  ✗ {} failed", suite.label).red().bold());
        eprintln!();
        for line in stdout.lines().filter(|l| l.contains("FAILED") || l.contains("panicked")) {
            eprintln!("  {}", line);
        }
        if counts.is_none() {
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        }
        anyhow::bail!("{} failed", suite.label);
    }

    let counts = counts.unwrap_or_default();
    println!(
        "{}",
        format!(
            "  ✓ {}: {} ({:.2}s)",
            suite.label,
            counts,
            start.elapsed().as_secs_f64()
        )
        .green()
    );
    println!();
    Ok(counts)
}

pub fn run(unit_only: bool, integration_only: bool, cases: Option<u32>) -> Result<()> {
    println!();
    println!("{}", "🧪 Running logger test suites...".cyan().bold());
    if let Some(cases) = cases {
        println!("{}", format!("   {} cases per property", cases).dimmed());
    }
    println!();

    let total_start = Instant::now();
    let mut total = Tally::default();
    for suite in SUITES
        .iter()
        .filter(|s| selected(s.kind, unit_only, integration_only))
    {
        let counts = run_suite(suite, cases)?;
        total.binaries = total.binaries.saturating_add(counts.binaries);
        total.passed = total.passed.saturating_add(counts.passed);
        total.ignored = total.ignored.saturating_add(counts.ignored);
    }

    println!(
        "{}",
        format!(
            "✓ {} in {:.2}s",
            total,
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_lines_of_every_binary_are_summed() {
        let output = "running 3 tests\n\
                      test a ... ok\n\
                      test result: ok. 3 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out\n\
                      running 5 tests\n\
                      test result: ok. 4 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out\n";
        assert_eq!(
            tally(output),
            Some(Tally {
                binaries: 2,
                passed: 7,
                failed: 0,
                ignored: 1,
            })
        );
    }

    #[test]
    fn failures_are_counted() {
        let output = "test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured\n";
        assert_eq!(tally(output).map(|t| t.failed), Some(1));
    }

    #[test]
    fn build_failure_has_no_tally() {
        assert_eq!(tally("error[E0308]: mismatched types"), None);
    }

    #[test]
    fn unit_flag_keeps_only_unit_suites() {
        let picked: Vec<_> = SUITES
            .iter()
            .filter(|s| selected(s.kind, true, false))
            .map(|s| s.label)
            .collect();
        assert_eq!(picked, vec!["unit, all crates"]);
    }

    #[test]
    fn integration_flag_includes_properties_but_not_docs() {
        let kinds: Vec<_> = SUITES
            .iter()
            .filter(|s| selected(s.kind, false, true))
            .map(|s| s.kind)
            .collect();
        assert!(kinds.contains(&Kind::Property));
        assert!(!kinds.contains(&Kind::Doc));
        assert!(!kinds.contains(&Kind::Unit));
    }
}
