use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// Target used to prove the library crates build without `std`.
const NO_STD_TARGET: &str = "thumbv7em-none-eabihf";

struct Step {
    label: &'static str,
    args: &'static [&'static str],
}

const BUILD_STEPS: [Step; 4] = [
    Step {
        label: "firmware, hardware (no_std + defmt)",
        args: &["check", "-p", "firmware", "--target", NO_STD_TARGET, "--features", "hardware"],
    },
    Step {
        label: "firmware, emulator (host)",
        args: &["check", "-p", "firmware", "--features", "emulator", "--examples"],
    },
    Step {
        label: "platform (no_std)",
        args: &["check", "-p", "platform", "--target", NO_STD_TARGET, "--no-default-features"],
    },
    Step {
        label: "bluetooth (no_std)",
        args: &["check", "-p", "bluetooth", "--target", NO_STD_TARGET, "--no-default-features"],
    },
];

fn cargo(step: &Step) -> Result<()> {
    println!("{}", format!("  Checking {}...", step.label).cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(step.args)
        .output()
        .with_context(|| format!("Failed to check {}", step.label))?;

    if !output.status.success() {
        eprintln!("{}", format!("  ✗ {} failed", step.label).red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("{} check failed", step.label);
    }

    println!(
        "{}",
        format!("  ✓ {} passed in {:.2}s", step.label, start.elapsed().as_secs_f64()).green()
    );
    println!();
    Ok(())
}

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking logger builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    for step in &BUILD_STEPS {
        cargo(step)?;
    }

    // Clippy lints
    println!("{}", "  Running clippy lints...".cyan());
    let clippy_start = Instant::now();

    let clippy_output = Command::new("cargo")
        .args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
        .output()
        .context("Failed to run clippy")?;

    if clippy_output.status.success() {
        println!(
            "{}",
            format!(
                "  ✓ Clippy passed in {:.2}s",
                clippy_start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else {
        eprintln!("{}", "  ⚠ Clippy warnings found".yellow().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&clippy_output.stderr));
    }
    println!();

    // Format check
    println!("{}", "  Checking code formatting...".cyan());

    let fmt_output = Command::new("cargo")
        .args(["fmt", "--all", "--check"])
        .output()
        .context("Failed to run cargo fmt")?;

    if fmt_output.status.success() {
        println!("{}", "  ✓ Formatting check passed".green());
    } else {
        eprintln!("{}", "  ⚠ Formatting issues found".yellow().bold());
        eprintln!("     Run 'cargo fmt --all' to fix");
    }
    println!();

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
