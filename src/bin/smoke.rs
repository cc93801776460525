use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use display_tuner_lib::app::config::load_config;
use display_tuner_lib::app::logging::init_logging_with_default;
use display_tuner_lib::app::scaling::{ScalingPlan, DEFAULT_SCALE};
use display_tuner_lib::app::state::AppState;
use display_tuner_lib::app::tuner::parse::UNKNOWN;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    json: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    started_at: String,
    serial: Option<String>,
    launcher: Vec<String>,
    facts: HashMap<String, String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                return Err("Usage: cargo run --bin smoke -- [--serial SERIAL] [--json]\n".to_string());
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }
    Ok(Args { serial, json })
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Result<(), ()>
where
    F: FnOnce() -> Result<Option<String>, (String, String)>,
{
    let start = Instant::now();
    match f() {
        Ok(warning) => {
            checks.push(SmokeCheck {
                name,
                status: if warning.is_some() { "warn" } else { "pass" },
                duration_ms: start.elapsed().as_millis(),
                error_code: warning.as_ref().map(|_| "WARN".to_string()),
                error: warning,
            });
            Ok(())
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                error_code: Some(code),
                error: Some(err),
            });
            Err(())
        }
    }
}

fn print_summary(summary: &SmokeSummary, json: bool) {
    let output = if json {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut text = format!("status: {}\ntrace_id: {}\n", summary.status, summary.trace_id);
        for check in &summary.checks {
            text.push_str(&format!("  {:<24} {}\n", check.name, check.status));
        }
        text
    };
    println!("{output}");
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };
    init_logging_with_default("warn");

    let trace_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().to_rfc3339();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut facts: HashMap<String, String> = HashMap::new();
    let mut status = "pass";

    let mut config = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            checks.push(SmokeCheck {
                name: "load_config",
                status: "fail",
                duration_ms: 0,
                error_code: Some(err.code.clone()),
                error: Some(err.error),
            });
            let summary = SmokeSummary {
                tool: "display_tuner_smoke",
                status: "fail",
                trace_id,
                started_at,
                serial: args.serial,
                launcher: Vec::new(),
                facts,
                checks,
            };
            print_summary(&summary, args.json);
            std::process::exit(1);
        }
    };
    if let Some(serial) = args.serial.as_ref() {
        config.command.launcher = adb_launcher(serial);
    }
    let launcher = config.command.launcher.clone();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    let tuner = state.tuner();

    if run_check(&mut checks, "probe_connectivity", || {
        if tuner.probe_connectivity() {
            Ok(None)
        } else {
            Err((
                "ERR_CONNECTIVITY".to_string(),
                "Privileged shell is not reachable".to_string(),
            ))
        }
    })
    .is_err()
    {
        status = "fail";
    }

    let _ = run_check(&mut checks, "device_info", || {
        let version = tuner.get_device_info();
        let warning = (version == UNKNOWN).then(|| "Android version unavailable".to_string());
        facts.insert("android_version".to_string(), version);
        Ok(warning)
    });

    let _ = run_check(&mut checks, "physical_geometry", || {
        let resolution = tuner.get_current_resolution();
        let density = tuner.get_current_density();
        let warning = (resolution == UNKNOWN || density == UNKNOWN)
            .then(|| "Physical size or density label missing".to_string());
        facts.insert("physical_resolution".to_string(), resolution);
        facts.insert("physical_density".to_string(), density);
        Ok(warning)
    });

    if run_check(&mut checks, "query_geometry", || {
        let geometry = tuner
            .query_geometry()
            .map_err(|err| (err.code.clone(), err.error))?;
        let target = ScalingPlan::new(geometry).target_for(DEFAULT_SCALE, false);
        facts.insert("effective_resolution".to_string(), geometry.resolution_label());
        facts.insert("effective_density".to_string(), geometry.density_dpi.to_string());
        facts.insert(
            "default_scale_target".to_string(),
            format!("{} @ {}dpi", target.resolution_label(), target.density_dpi),
        );
        Ok(None)
    })
    .is_err()
    {
        status = "fail";
    }

    let _ = run_check(&mut checks, "secure_settings_permission", || {
        let granted = tuner.has_secure_settings_permission();
        facts.insert("secure_settings_granted".to_string(), granted.to_string());
        Ok((!granted).then(|| "WRITE_SECURE_SETTINGS is not granted".to_string()))
    });

    let async_probe = tuner.probe_connectivity_async().wait();
    checks.push(SmokeCheck {
        name: "async_probe",
        status: if async_probe.is_ok() { "pass" } else { "warn" },
        duration_ms: 0,
        error_code: async_probe.as_ref().err().map(|f| f.error.code.clone()),
        error: async_probe.as_ref().err().map(|f| f.error.error.clone()),
    });

    let report = state.shutdown();
    facts.insert("pool_graceful".to_string(), report.graceful.to_string());

    let summary = SmokeSummary {
        tool: "display_tuner_smoke",
        status,
        trace_id,
        started_at,
        serial: args.serial,
        launcher,
        facts,
        checks,
    };
    print_summary(&summary, args.json);
    if summary.status != "pass" {
        std::process::exit(1);
    }
}

fn adb_launcher(serial: &str) -> Vec<String> {
    ["adb", "-s", serial, "shell"]
        .iter()
        .map(|part| part.to_string())
        .collect()
}
