use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::adb::gateway::DeviceGateway;
use crate::app::config::CaptureSettings;
use crate::app::display::variant::VariantTag;
use crate::app::error::AppError;
use crate::app::fallback::FallbackChain;

pub const PNG_SIGNATURE: &[u8] = b"\x89PNG";
const PRIMARY_DISPLAY: &str = "0";

/// How a capture candidate reaches the device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTransport {
    /// Persistent adb server connection.
    Server,
    /// Fresh `adb exec-out` process per attempt.
    Process,
}

impl CaptureTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureTransport::Server => "server",
            CaptureTransport::Process => "process",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest<'a> {
    pub serial: &'a str,
    pub display_id: &'a str,
    pub variant: Option<VariantTag>,
    pub physical_id: Option<&'a str>,
}

fn qualified_forms(id: &str) -> [String; 2] {
    [
        format!("screencap -d {id} -p"),
        format!("screencap -p -d {id}"),
    ]
}

/// Ordered, de-duplicated capture commands for a display. Depends only on its arguments.
pub fn capture_candidates(
    variant: Option<VariantTag>,
    display_id: &str,
    physical_id: Option<&str>,
) -> Vec<String> {
    let is_primary = display_id == PRIMARY_DISPLAY;
    let logical = qualified_forms(display_id);
    let physical = physical_id
        .map(str::trim)
        .filter(|physical| !physical.is_empty() && *physical != display_id)
        .map(qualified_forms);
    let bare = is_primary.then(|| "screencap -p".to_string());

    let mut ordered: Vec<String> = Vec::new();
    if variant == Some(VariantTag::Ss4) {
        ordered.extend(logical);
        ordered.extend(bare);
        ordered.extend(physical.into_iter().flatten());
    } else if is_primary {
        ordered.extend(bare);
        ordered.extend(physical.into_iter().flatten());
        ordered.extend(logical);
    } else {
        ordered.extend(logical);
        ordered.extend(physical.into_iter().flatten());
    }

    let mut candidates = Vec::with_capacity(ordered.len());
    for command in ordered {
        if !candidates.contains(&command) {
            candidates.push(command);
        }
    }
    candidates
}

/// Drops any diagnostic text the tool printed ahead of the image.
pub fn extract_png(bytes: &[u8]) -> Option<&[u8]> {
    bytes
        .windows(PNG_SIGNATURE.len())
        .position(|window| window == PNG_SIGNATURE)
        .map(|start| &bytes[start..])
}

fn run_candidate(
    gateway: &dyn DeviceGateway,
    transport: CaptureTransport,
    serial: &str,
    command: &str,
    min_bytes: usize,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<u8>, String> {
    let output = match transport {
        CaptureTransport::Server => gateway.shell(serial, command, timeout, trace_id),
        CaptureTransport::Process => gateway.shell_process(serial, command, timeout, trace_id),
    }
    .map_err(|err| err.error)?;
    if output.len() <= min_bytes {
        return Err(format!(
            "`{command}` returned {} bytes, expected more than {min_bytes}",
            output.len()
        ));
    }
    Ok(output)
}

pub fn capture(
    gateway: &dyn DeviceGateway,
    request: &CaptureRequest<'_>,
    settings: &CaptureSettings,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<u8>, AppError> {
    let candidates = capture_candidates(request.variant, request.display_id, request.physical_id);
    let mut chain = FallbackChain::new("screencap");
    for transport in &settings.transports {
        for command in &candidates {
            let transport = *transport;
            chain.push(format!("{}: {command}", transport.as_str()), move || {
                run_candidate(
                    gateway,
                    transport,
                    request.serial,
                    command,
                    settings.min_png_bytes,
                    timeout,
                    trace_id,
                )
            });
        }
    }

    let resolved = chain.run(trace_id).map_err(|exhausted| {
        AppError::capture_failed(
            format!(
                "Screenshot failed for display {}: {}",
                request.display_id,
                exhausted.last_error().unwrap_or("no capture candidates")
            ),
            trace_id,
        )
    })?;

    let Some(png) = extract_png(&resolved.value) else {
        warn!(
            trace_id = %trace_id,
            display_id = %request.display_id,
            candidate = %resolved.label,
            "capture output is not a PNG"
        );
        return Err(AppError::invalid_image(
            format!("`{}` did not return PNG data", resolved.label),
            trace_id,
        ));
    };
    info!(
        trace_id = %trace_id,
        serial = %request.serial,
        display_id = %request.display_id,
        candidate = %resolved.label,
        bytes = png.len(),
        "captured screenshot"
    );
    Ok(png.to_vec())
}
