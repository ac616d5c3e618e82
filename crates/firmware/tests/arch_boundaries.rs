//! Architecture boundary tests, run with `cargo test -p firmware --test arch_boundaries`
// Architecture test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//!
//! Layering rules:
//!   Rule 1: platform (HAL) must not depend on firmware or bluetooth
//!   Rule 2: bluetooth (protocol) must not depend on firmware
//!   Rule 3: tasks talk only through `ProcessContext`, never to each other
//!   Rule 4: log lines stay inside the subset defmt and tracing both accept
//!
//! Rules 1 and 2 are also enforced by the dependency graph itself: a cycle
//! would fail to build. The manifest checks below catch a dev-dependency
//! sneaking in.

const PLATFORM_MANIFEST: &str = include_str!("../../platform/Cargo.toml");
const BLUETOOTH_MANIFEST: &str = include_str!("../../bluetooth/Cargo.toml");

const TASK_SOURCES: [(&str, &str); 5] = [
    ("clock", include_str!("../src/tasks/clock.rs")),
    ("storage", include_str!("../src/tasks/storage.rs")),
    ("transfer", include_str!("../src/tasks/transfer.rs")),
    ("measure", include_str!("../src/tasks/measure.rs")),
    ("voltage", include_str!("../src/tasks/voltage.rs")),
];

const CORE_SOURCES: [(&str, &str); 5] = [
    ("context", include_str!("../src/context.rs")),
    ("sleep", include_str!("../src/sleep.rs")),
    ("watchdog", include_str!("../src/watchdog.rs")),
    ("retained", include_str!("../src/retained.rs")),
    ("runtime", include_str!("../src/runtime.rs")),
];

/// Source text before the unit-test module, if any.
fn non_test(source: &str) -> &str {
    source.split("#[cfg(test)]").next().unwrap()
}

#[test]
fn platform_is_independent_of_app_layers() {
    for forbidden in ["firmware", "bluetooth"] {
        assert!(
            !PLATFORM_MANIFEST.contains(&format!("{forbidden} = ")),
            "platform/Cargo.toml must not depend on {forbidden}"
        );
    }

    // Core HAL traits are nameable without any firmware type.
    fn _storage<T: platform::StorageMedium>() {}
    fn _time<T: platform::TimeSource>() {}
    fn _radio<T: platform::WirelessStack>() {}
}

#[test]
fn bluetooth_is_independent_of_firmware() {
    assert!(
        !BLUETOOTH_MANIFEST.contains("firmware = "),
        "bluetooth/Cargo.toml must not depend on firmware"
    );
}

#[test]
fn tasks_do_not_reach_into_each_other() {
    for (name, source) in TASK_SOURCES {
        let code = non_test(source);
        for (other, _) in TASK_SOURCES {
            if other == name {
                continue;
            }
            for pattern in [format!("super::{other}"), format!("tasks::{other}")] {
                assert!(
                    !code.contains(&pattern),
                    "tasks/{name}.rs uses `{pattern}`; share state through ProcessContext instead"
                );
            }
        }
    }
}

#[test]
fn log_lines_avoid_debug_formatting() {
    let sources = TASK_SOURCES.iter().chain(CORE_SOURCES.iter());
    for (name, source) in sources {
        let code = non_test(source);
        for line in code.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") {
                continue;
            }
            assert!(
                !line.contains("{:?}") && !line.contains("{:#?}"),
                "{name}.rs: `{}` uses Debug formatting; wrap the value in Dbg",
                trimmed
            );
        }
    }
}

#[test]
fn library_code_never_unwraps() {
    let sources = TASK_SOURCES.iter().chain(CORE_SOURCES.iter());
    for (name, source) in sources {
        let code = non_test(source);
        for forbidden in [".unwrap()", ".expect(", "panic!("] {
            assert!(
                !code.contains(forbidden),
                "{name}.rs contains `{forbidden}` outside tests"
            );
        }
    }
}
