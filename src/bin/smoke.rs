use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use carui_inspector_lib::app::commands::{
    acquire_hierarchy, capture_screenshot, connect_device, get_displays,
};
use carui_inspector_lib::app::config::load_config;
use carui_inspector_lib::app::logging::init_logging;
use carui_inspector_lib::app::state::AppState;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    display: String,
    out_dir: Option<PathBuf>,
    accessibility: bool,
    json: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: Option<String>,
    display: String,
    out_dir: String,
    artifacts: HashMap<String, String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn
    duration_ms: u128,
    artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

type CheckResult = Result<(Vec<String>, Option<String>), (String, String)>;

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut display = "0".to_string();
    let mut out_dir: Option<PathBuf> = None;
    let mut accessibility = false;
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
            "--display" => {
                display = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| "--display requires a value".to_string())?;
            }
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--accessibility" => {
                accessibility = true;
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                return Err(
                    "Usage: cargo run --bin smoke -- [--serial SERIAL] [--display ID] [--out DIR] [--accessibility] [--json]\n"
                        .to_string(),
                );
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        serial,
        display,
        out_dir,
        accessibility,
        json,
    })
}

fn ensure_dir(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|err| format!("Failed to create dir {}: {err}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), (String, String)> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|err| ("ERR_SYSTEM".to_string(), format!("Failed to serialize: {err}")))?;
    fs::write(path, body).map_err(|err| {
        (
            "ERR_SYSTEM".to_string(),
            format!("Failed to write {}: {err}", path.display()),
        )
    })
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> bool
where
    F: FnOnce() -> CheckResult,
{
    let start = Instant::now();
    match f() {
        Ok((artifacts, warning)) => {
            checks.push(SmokeCheck {
                name,
                status: if warning.is_some() { "warn" } else { "pass" },
                duration_ms: start.elapsed().as_millis(),
                artifacts,
                error_code: None,
                error: warning,
            });
            true
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                artifacts: vec![],
                error_code: Some(code),
                error: Some(err),
            });
            false
        }
    }
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        let mut p = std::env::temp_dir();
        p.push(format!("carui_inspector_smoke_{trace_id}"));
        p
    });
    if let Err(err) = ensure_dir(&out_dir) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);
    let state = match AppState::new(config, &trace_id) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let mut artifacts: HashMap<String, String> = HashMap::new();
    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut serial = args.serial.clone();

    let connected = run_check(&mut checks, "connect_device", || {
        let resp = connect_device(serial.clone(), &state, Some(trace_id.clone()))
            .map_err(|err| (err.code.clone(), err.error.clone()))?;
        serial = Some(resp.data.serial.clone());
        let path = out_dir.join("device.json");
        write_json(&path, &resp.data)?;
        artifacts.insert("device".to_string(), path.to_string_lossy().to_string());
        Ok((vec![path.to_string_lossy().to_string()], None))
    });

    if connected {
        run_check(&mut checks, "get_displays", || {
            let resp = get_displays(&state, Some(trace_id.clone()))
                .map_err(|err| (err.code.clone(), err.error.clone()))?;
            let path = out_dir.join("displays.json");
            write_json(&path, &resp.data)?;
            artifacts.insert("displays".to_string(), path.to_string_lossy().to_string());
            let warning = state
                .session
                .topology()
                .is_none()
                .then(|| "topology unresolved; static display list used".to_string());
            Ok((vec![path.to_string_lossy().to_string()], warning))
        });

        run_check(&mut checks, "capture_screenshot", || {
            let resp = capture_screenshot(args.display.clone(), &state, Some(trace_id.clone()))
                .map_err(|err| (err.code.clone(), err.error.clone()))?;
            let path = out_dir.join(format!("display_{}.png", args.display));
            fs::write(&path, &resp.data).map_err(|err| {
                (
                    "ERR_SYSTEM".to_string(),
                    format!("Failed to write screenshot: {err}"),
                )
            })?;
            artifacts.insert("screenshot".to_string(), path.to_string_lossy().to_string());
            Ok((vec![path.to_string_lossy().to_string()], None))
        });

        run_check(&mut checks, "acquire_hierarchy", || {
            let resp = acquire_hierarchy(
                args.display.clone(),
                Some(args.accessibility),
                &state,
                Some(trace_id.clone()),
            )
            .map_err(|err| (err.code.clone(), err.error.clone()))?;
            let path = out_dir.join(format!("hierarchy_{}.json", args.display));
            write_json(&path, &resp.data)?;
            artifacts.insert("hierarchy".to_string(), path.to_string_lossy().to_string());
            let warning = resp.data.error.clone().map(|error| {
                format!("source {}: {error}", resp.data.source.as_str())
            });
            Ok((vec![path.to_string_lossy().to_string()], warning))
        });
    }

    let status = if checks.iter().any(|check| check.status == "fail") {
        "fail"
    } else {
        "pass"
    };
    let summary = SmokeSummary {
        tool: "carui_inspector_smoke",
        status,
        trace_id: trace_id.clone(),
        serial,
        display: args.display.clone(),
        out_dir: out_dir.to_string_lossy().to_string(),
        artifacts,
        checks,
    };
    let summary_path = out_dir.join("summary.json");
    if let Err((_, err)) = write_json(&summary_path, &summary) {
        eprintln!("{err}");
    }

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut lines = vec![
            format!("status: {}", summary.status),
            format!("trace_id: {}", summary.trace_id),
            format!("out: {}", summary.out_dir),
        ];
        for check in &summary.checks {
            let detail = check.error.as_deref().unwrap_or("");
            lines.push(format!("  {:<20} {:<5} {}", check.name, check.status, detail));
        }
        lines.join("\n")
    };

    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
}
