//! xtask emulate - run wake cycles on the desktop
//!
//! Builds and runs the `emulator` example of the firmware crate with the
//! given card directory and cycle count. With `--watch` the emulator is
//! rerun whenever a source file changes:
//! 1. Build and run the emulator with cargo run
//! 2. Watch .rs/.toml files under the library crates
//! 3. On change: kill the run if it is still going, rebuild, rerun

use anyhow::{Context, Result};
use colored::Colorize;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use platform::config;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

const WATCH_PATHS: [&str; 5] = [
    "crates/firmware/src",
    "crates/firmware/examples",
    "crates/firmware/Cargo.toml",
    "crates/platform/src",
    "crates/bluetooth/src",
];

pub fn run(cycles: u32, card: &Path, watch: bool) -> Result<()> {
    clear_screen();
    print_banner();
    println!(
        "{}",
        format!("{} wake cycles, card at {}", cycles, card.display()).dimmed()
    );
    println!();

    if !watch {
        let status = emulator_command(cycles, card)
            .status()
            .context("Failed to run cargo")?;
        if !status.success() {
            anyhow::bail!("Emulator run failed");
        }
        print_card(card);
        return Ok(());
    }

    let mut emulator_process = match start_emulator(cycles, card) {
        Ok(process) => Some(process),
        Err(e) => {
            eprintln!("{}", format!("Build failed: {}", e).red().bold());
            eprintln!("{}", "Fix errors and save to trigger rebuild".dimmed());
            println!();
            None
        }
    };

    let (tx, rx) = channel();
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event.paths.iter().any(|p| {
                        p.extension()
                            .map(|ext| ext == "rs" || ext == "toml")
                            .unwrap_or(false)
                    })
                {
                    let _ = tx.send(());
                }
            }
        },
        notify::Config::default(),
    )?;

    for path in WATCH_PATHS.iter().map(Path::new) {
        if path.exists() {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch path: {}", path.display()))?;
        }
    }

    println!("{}", "Watching for changes".green().bold());
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let mut last_rebuild = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) => {
                // Debounce bursts of editor events.
                if last_rebuild.elapsed() < Duration::from_millis(500) {
                    continue;
                }
                std::thread::sleep(Duration::from_millis(200));
                while rx.try_recv().is_ok() {}
                last_rebuild = Instant::now();

                if let Some(mut process) = emulator_process.take() {
                    let _ = process.kill();
                    let _ = process.wait();
                }

                clear_screen();
                print_banner();
                println!("{}", "Changes detected - rebuilding...".yellow().bold());

                match start_emulator(cycles, card) {
                    Ok(process) => emulator_process = Some(process),
                    Err(e) => {
                        eprintln!("{}", format!("Build failed: {}", e).red().bold());
                        println!("{}", "Fix errors and save to trigger rebuild".dimmed());
                        println!();
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if let Some(ref mut process) = emulator_process {
                    if let Ok(Some(status)) = process.try_wait() {
                        println!();
                        if status.success() {
                            println!("{}", "Emulator finished".green());
                            print_card(card);
                        } else {
                            println!(
                                "{}",
                                format!("Emulator exited with code: {}", status.code().unwrap_or(-1))
                                    .yellow()
                            );
                        }
                        println!("{}", "Waiting for changes...".dimmed());
                        println!();
                        emulator_process = None;
                    }
                }
            }
            Err(e) => {
                eprintln!("Watcher error: {}", e);
                break;
            }
        }
    }

    if let Some(mut process) = emulator_process {
        let _ = process.kill();
        let _ = process.wait();
    }

    Ok(())
}

fn emulator_command(cycles: u32, card: &Path) -> Command {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-p", "firmware", "--example", "emulator", "--features", "emulator", "--"])
        .arg(cycles.to_string())
        .env("CARD_PATH", card)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    // The emulator defaults to "info" itself; forward an explicit filter only.
    if let Ok(filter) = std::env::var("RUST_LOG") {
        cmd.env("RUST_LOG", filter);
    }
    cmd
}

fn start_emulator(cycles: u32, card: &Path) -> Result<Child> {
    let start = Instant::now();
    println!();
    println!("{}", "Building emulator...".bold());
    println!();

    let child = emulator_command(cycles, card)
        .spawn()
        .context("Failed to spawn emulator")?;

    println!(
        "{}",
        format!("Started in {:.1}s", start.elapsed().as_secs_f64()).green()
    );
    println!();
    Ok(child)
}

/// List what the emulated card holds after a run.
fn print_card(card: &Path) {
    let mut files = Vec::new();
    collect_files(card, &mut files);
    files.sort();
    println!("{}", "Card contents:".bold());
    for (path, len) in files {
        let shown = path.strip_prefix(card).unwrap_or(&path);
        println!("  /{:<40} {:>8} bytes", shown.display().to_string(), len);
    }
    println!();
}

fn collect_files(dir: &Path, out: &mut Vec<(std::path::PathBuf, u64)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.metadata() {
            Ok(meta) if meta.is_dir() => collect_files(&path, out),
            Ok(meta) => out.push((path, meta.len())),
            Err(_) => {}
        }
    }
}

fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
    io::stdout().flush().ok();
}

fn print_banner() {
    let banner_text = format!("     {} {} - Emulator       ", config::APP_NAME, config::APP_VERSION);
    println!("{}", "═════════════════════════════════════════════".cyan());
    println!("{}", banner_text.cyan().bold());
    println!("{}", "═════════════════════════════════════════════".cyan());
    println!();
}
