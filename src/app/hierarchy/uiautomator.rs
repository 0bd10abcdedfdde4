use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::app::adb::gateway::DeviceGateway;
use crate::app::config::HierarchySettings;
use crate::app::fallback::FallbackChain;
use crate::app::hierarchy::merge::{merge_dump, MergeOptions, MergeOutcome};
use crate::app::hierarchy::ui_xml::{parse_dump, DumpDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpScope {
    /// Every window of every display in one `<displays>` document.
    AllWindows,
    /// Only the requested display.
    Display,
}

impl DumpScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpScope::AllWindows => "all-windows",
            DumpScope::Display => "display",
        }
    }
}

pub fn dump_command(scope: DumpScope, display_id: &str, path: &str) -> String {
    match scope {
        DumpScope::AllWindows => format!("uiautomator dump --windows {path}"),
        DumpScope::Display if display_id == "0" => format!("uiautomator dump {path}"),
        DumpScope::Display => format!("uiautomator dump --display {display_id} {path}"),
    }
}

fn dump_failed(output: &str) -> bool {
    let lowered = output.to_lowercase();
    lowered.contains("error") || lowered.contains("idle state") || lowered.contains("not idle")
}

fn dump_once(
    gateway: &dyn DeviceGateway,
    serial: &str,
    command: &str,
    path: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<DumpDocument, String> {
    // A stale file from an earlier dump must not be mistaken for this one.
    let _ = gateway.shell(serial, &format!("rm -f {path}"), timeout, trace_id);
    let output = gateway
        .shell_text(serial, command, timeout, trace_id)
        .map_err(|err| err.error)?;
    if dump_failed(&output) {
        return Err(format!("`{command}` reported: {}", output.trim()));
    }
    let xml = gateway
        .shell_text(serial, &format!("cat {path}"), timeout, trace_id)
        .map_err(|err| err.error)?;
    parse_dump(&xml)
}

fn dump_with_retries(
    gateway: &dyn DeviceGateway,
    serial: &str,
    command: &str,
    settings: &HierarchySettings,
    timeout: Duration,
    trace_id: &str,
) -> Result<DumpDocument, String> {
    let attempts = settings.dump_retries.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        if attempt > 1 && settings.retry_delay_ms > 0 {
            thread::sleep(Duration::from_millis(settings.retry_delay_ms));
        }
        match dump_once(gateway, serial, command, &settings.dump_path, timeout, trace_id) {
            Ok(document) => {
                debug!(
                    trace_id = %trace_id,
                    command = %command,
                    attempt,
                    nodes = document.node_count(),
                    "dump parsed"
                );
                return Ok(document);
            }
            Err(err) => {
                debug!(
                    trace_id = %trace_id,
                    command = %command,
                    attempt,
                    error = %err,
                    "dump attempt failed"
                );
                last_error = err;
            }
        }
    }
    Err(last_error)
}

/// OS dump tool path: all-windows form first, then the display-scoped form.
pub fn acquire(
    gateway: &dyn DeviceGateway,
    serial: &str,
    display_id: &str,
    options: &MergeOptions<'_>,
    settings: &HierarchySettings,
    timeout: Duration,
    trace_id: &str,
) -> Result<MergeOutcome, String> {
    let mut chain = FallbackChain::new("uiautomator");
    for scope in [DumpScope::AllWindows, DumpScope::Display] {
        let command = dump_command(scope, display_id, &settings.dump_path);
        chain.push(scope.as_str(), move || {
            let document =
                dump_with_retries(gateway, serial, &command, settings, timeout, trace_id)?;
            // A flat all-windows dump describes the default display only.
            if scope == DumpScope::AllWindows
                && display_id != "0"
                && matches!(document, DumpDocument::Flat(_))
            {
                return Err(format!("`{command}` returned a single-display dump"));
            }
            let outcome = merge_dump(document, display_id, options);
            if outcome.nodes.is_empty() {
                return Err(format!("`{command}` has no nodes for display {display_id}"));
            }
            Ok(outcome)
        });
    }
    chain
        .run(trace_id)
        .map(|resolved| resolved.value)
        .map_err(|exhausted| {
            warn!(
                trace_id = %trace_id,
                display_id = %display_id,
                error = %exhausted,
                "uiautomator dump failed"
            );
            exhausted
                .last_error()
                .unwrap_or("uiautomator dump failed")
                .to_string()
        })
}
