//! xtask config - show what a build would run with
//!
//! Prints the default tunables and the capability set after the precedence
//! rules have been applied, so a board variant can be checked before flashing.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use firmware::{Capabilities, DutyLevel, LoggerConfig, SensorKind, SurveyMode};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Survey {
    Off,
    Monthly,
    Standalone,
}

impl From<Survey> for SurveyMode {
    fn from(s: Survey) -> Self {
        match s {
            Survey::Off => SurveyMode::Off,
            Survey::Monthly => SurveyMode::Monthly,
            Survey::Standalone => SurveyMode::Standalone,
        }
    }
}

#[derive(Args, Debug)]
pub struct CapsArgs {
    /// Raw receiver survey mode
    #[arg(long, value_enum, default_value_t = Survey::Off)]
    survey: Survey,
    /// Sleep a token interval and never power the receiver down
    #[arg(long)]
    continuous: bool,
    /// Older receiver that only disciplines the internal clock
    #[arg(long)]
    legacy_clock: bool,
    /// Board without the ranging sensor
    #[arg(long)]
    no_sensor: bool,
    /// Board without short-range wireless
    #[arg(long)]
    no_wireless: bool,
    /// Pick read interval and alignment from the battery voltage
    #[arg(long)]
    variable_duty: bool,
}

impl CapsArgs {
    fn requested(&self) -> Capabilities {
        Capabilities {
            survey: self.survey.into(),
            continuous: self.continuous,
            legacy_clock: self.legacy_clock,
            sensor: if self.no_sensor {
                SensorKind::None
            } else {
                SensorKind::Ranging
            },
            wireless: !self.no_wireless,
            variable_duty: self.variable_duty,
        }
    }
}

fn caps_json(caps: &Capabilities) -> Value {
    json!({
        "survey": caps.survey.as_str(),
        "continuous": caps.continuous,
        "legacy_clock": caps.legacy_clock,
        "sensor": caps.measures(),
        "wireless": caps.wireless,
        "variable_duty": caps.variable_duty,
    })
}

fn config_json(config: &LoggerConfig) -> Value {
    let p = &config.periods;
    json!({
        "read_interval_s": config.read_interval_s,
        "align_minutes": config.align_minutes,
        "survey_read_s": config.survey_read_s,
        "standalone_sleep_s": config.standalone_sleep_s,
        "fix_delay_ms": config.fix_delay.as_millis(),
        "wake_cycles": config.wake_cycles,
        "survey_period_s": config.survey_period_s,
        "watchdog_deadline_ms": config.watchdog_deadline.as_millis(),
        "periods_ms": {
            "clock": p.clock.as_millis(),
            "storage": p.storage.as_millis(),
            "sleep": p.sleep.as_millis(),
            "watchdog": p.watchdog.as_millis(),
            "measurement": p.measurement.as_millis(),
            "voltage": p.voltage.as_millis(),
            "transfer": p.transfer.as_millis(),
        },
        "data_file_cap": config.data_file_cap,
        "raw_file_cap": config.raw_file_cap,
        "raw_block_bytes": config.raw_block_bytes,
        "receiver_buffer_bytes": config.receiver_buffer_bytes,
        "receiver_warn_bytes": config.receiver_warn_bytes(),
        "transfer_ceiling": config.transfer_ceiling,
        "chunk_bytes": config.chunk_bytes,
        "chunk_delay_ms": config.chunk_delay.as_millis(),
        "manifest_chunk_bytes": config.manifest_chunk_bytes,
        "advertise_window_ms": config.advertise_window.as_millis(),
        "advertise_interval_ms": config.advertise_interval.as_millis(),
        "error_dwell_ms": config.error_dwell.as_millis(),
        "device_name": config.device_name,
        "ranging_window_mm": [config.ranging_min_mm, config.ranging_max_mm],
        "duty_volts": {
            "frequent": config.duty.frequent_volts,
            "normal": config.duty.normal_volts,
        },
    })
}

fn duty_json() -> Value {
    let levels = [DutyLevel::Frequent, DutyLevel::Normal, DutyLevel::Conserve];
    Value::Array(
        levels
            .iter()
            .map(|l| {
                json!({
                    "level": l.as_str(),
                    "read_interval_s": l.read_interval_s(),
                    "align_minutes": l.align_minutes(),
                })
            })
            .collect(),
    )
}

/// Everything the command reports, as one JSON document.
fn report(args: &CapsArgs) -> Value {
    let config = LoggerConfig::default();
    let (resolved, adjustments) = args.requested().resolve();
    json!({
        "config": config_json(&config),
        "valid": config.validate().is_ok(),
        "requested": caps_json(&args.requested()),
        "resolved": caps_json(&resolved),
        "adjustments": adjustments.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
        "duty_levels": duty_json(),
    })
}

fn print_section(title: &str, value: &Value, indent: usize) {
    if let Value::Object(map) = value {
        if indent == 0 {
            println!("{}", title.cyan().bold());
        } else {
            println!("{:indent$}{}", "", title.bold());
        }
        for (key, v) in map {
            match v {
                Value::Object(_) => print_section(key, v, indent.saturating_add(2)),
                _ => println!("{:pad$}{:<26} {}", "", key, v, pad = indent.saturating_add(2)),
            }
        }
    }
}

pub fn run(args: &CapsArgs, json_out: bool) -> Result<()> {
    let report = report(args);
    if json_out {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    print_section("Default configuration", &report["config"], 0);
    println!();
    print_section("Requested capabilities", &report["requested"], 0);
    println!();
    print_section("Resolved capabilities", &report["resolved"], 0);
    println!();

    match report["adjustments"].as_array() {
        Some(list) if !list.is_empty() => {
            println!("{}", "Adjustments".yellow().bold());
            for a in list {
                println!("  ⚠ {}", a.as_str().unwrap_or_default());
            }
        }
        _ => println!("{}", "✓ No adjustments".green()),
    }
    println!();

    if report["valid"].as_bool() == Some(true) {
        println!("{}", "✓ Configuration valid".green().bold());
    } else {
        println!("{}", "✗ Configuration rejected".red().bold());
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        caps: CapsArgs,
    }

    fn report_for(args: &[&str]) -> Value {
        let harness = Harness::parse_from(std::iter::once("config").chain(args.iter().copied()));
        report(&harness.caps)
    }

    #[test]
    fn defaults_need_no_adjustment() {
        let r = report_for(&[]);
        assert_eq!(r["valid"], true);
        assert_eq!(r["adjustments"], json!([]));
        assert_eq!(r["resolved"], r["requested"]);
        assert_eq!(r["config"]["read_interval_s"], 60);
    }

    #[test]
    fn standalone_survey_drops_sensor_and_legacy_clock() {
        let r = report_for(&["--survey", "standalone", "--legacy-clock"]);
        assert_eq!(r["requested"]["sensor"], true);
        assert_eq!(r["resolved"]["sensor"], false);
        assert_eq!(r["resolved"]["legacy_clock"], false);
        assert_eq!(r["adjustments"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn duty_levels_are_listed_in_order() {
        let r = report_for(&["--variable-duty"]);
        let levels: Vec<_> = r["duty_levels"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["level"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(levels.len(), 3);
        assert_eq!(r["resolved"]["variable_duty"], true);
    }
}
