use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::parse::parse_single_value;
use crate::app::config::{save_config, validate_config, InspectorConfig};
use crate::app::display::topology::{self, DisplayTopology};
use crate::app::display::variant::{self, VariantTag};
use crate::app::error::AppError;
use crate::app::hierarchy::accessibility;
use crate::app::hierarchy::engine::{HierarchyEngine, HierarchyRequest};
use crate::app::interaction::{self, InputAction};
use crate::app::models::{
    AccessibilityStatus, CommandResponse, DeviceInfo, DeviceSummary, DisplayDescriptor,
    HierarchySnapshot, InputResult,
};
use crate::app::session::SessionContext;
use crate::app::state::AppState;
use crate::app::ui_capture::{self, CaptureRequest};

#[cfg(test)]
mod tests;

const MODEL_PROPERTY: &str = "ro.product.model";
const SDK_PROPERTY: &str = "ro.build.version.sdk";

fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            format!("{field} is required"),
            trace_id,
        ));
    }
    Ok(())
}

// Display ids end up inside device shell commands.
fn ensure_display_id(display_id: &str, trace_id: &str) -> Result<(), AppError> {
    ensure_non_empty(display_id, "display_id", trace_id)?;
    if !display_id.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(AppError::validation(
            format!("display_id must be a non-negative integer, got `{display_id}`"),
            trace_id,
        ));
    }
    Ok(())
}

fn read_property(state: &AppState, serial: &str, key: &str, trace_id: &str) -> Option<String> {
    match state.gateway.shell_text(
        serial,
        &format!("getprop {key}"),
        state.config.timeouts.probe(),
        trace_id,
    ) {
        Ok(output) => parse_single_value(&output),
        Err(err) => {
            warn!(trace_id = %trace_id, serial = %serial, key = %key, error = %err.error, "getprop failed");
            None
        }
    }
}

fn refresh_topology(state: &AppState, device: &DeviceInfo, trace_id: &str) -> Option<DisplayTopology> {
    let resolved = topology::resolve(
        state.gateway.as_ref(),
        &device.serial,
        state.config.timeouts.shell(),
        trace_id,
    );
    if resolved.is_some() {
        state.session.set_topology(&device.serial, resolved.clone());
    }
    resolved
}

/// Session snapshot with a topology, resolving one lazily when the session has none yet.
fn context_with_topology(state: &AppState, trace_id: &str) -> Result<SessionContext, AppError> {
    let mut context = state.session.context(trace_id)?;
    if context.topology.is_none() {
        context.topology = refresh_topology(state, &context.device, trace_id);
    }
    Ok(context)
}

pub fn get_config(state: &AppState, trace_id: Option<String>) -> CommandResponse<InspectorConfig> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "get_config");
    CommandResponse {
        trace_id,
        data: state.config.clone(),
    }
}

/// Persists a validated config; it takes effect the next time state is built.
pub fn save_app_config(
    config: InspectorConfig,
    trace_id: Option<String>,
) -> Result<CommandResponse<InspectorConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "save_app_config");
    let config = validate_config(config);
    save_config(&config).map_err(|err| AppError::system(err.error, &trace_id))?;
    Ok(CommandResponse {
        trace_id,
        data: config,
    })
}

pub fn list_devices(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<DeviceSummary>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "list_devices");
    let devices = state.gateway.list_devices(&trace_id)?;
    Ok(CommandResponse {
        trace_id,
        data: devices,
    })
}

/// Selects a device as current. Network addresses (`host:port`) are connected first;
/// without a serial the first online device is used.
pub fn connect_device(
    serial: Option<String>,
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<DeviceInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = ?serial, "connect_device");

    let requested = serial
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let serial = match requested {
        Some(address) if address.contains(':') => {
            state.gateway.connect(&address, &trace_id)?;
            address
        }
        Some(serial) => {
            let devices = state.gateway.list_devices(&trace_id)?;
            if !devices
                .iter()
                .any(|device| device.serial == serial && device.is_online())
            {
                return Err(AppError::dependency(
                    format!("Device {serial} is not online"),
                    &trace_id,
                ));
            }
            serial
        }
        None => state
            .gateway
            .list_devices(&trace_id)?
            .into_iter()
            .find(DeviceSummary::is_online)
            .map(|device| device.serial)
            .ok_or_else(|| AppError::dependency("No online device found", &trace_id))?,
    };

    let device = DeviceInfo {
        model: read_property(state, &serial, MODEL_PROPERTY, &trace_id),
        sdk: read_property(state, &serial, SDK_PROPERTY, &trace_id),
        variant: variant::classify(
            state.gateway.as_ref(),
            &serial,
            state.config.timeouts.probe(),
            &trace_id,
        ),
        serial,
    };
    state.session.select(device.clone());
    let displays = refresh_topology(state, &device, &trace_id)
        .map(|topology| topology.descriptors.len())
        .unwrap_or(0);
    info!(
        trace_id = %trace_id,
        serial = %device.serial,
        variant = ?device.variant,
        displays,
        "device selected"
    );

    Ok(CommandResponse {
        trace_id,
        data: device,
    })
}

/// Drops the current device. Returns whether one was selected.
pub fn disconnect_device(state: &AppState, trace_id: Option<String>) -> CommandResponse<bool> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "disconnect_device");
    let had_device = state.session.current().is_some();
    state.session.clear();
    CommandResponse {
        trace_id,
        data: had_device,
    }
}

/// Resolved displays of the current device, or the static seat list when the dumps are unusable.
pub fn get_displays(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<DisplayDescriptor>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "get_displays");
    let context = state.session.context(&trace_id)?;
    let descriptors = match refresh_topology(state, &context.device, &trace_id) {
        Some(topology) => topology.descriptors,
        None => {
            warn!(trace_id = %trace_id, serial = %context.serial(), "using static display list");
            topology::fallback_descriptors()
        }
    };
    Ok(CommandResponse {
        trace_id,
        data: descriptors,
    })
}

pub fn resolve_topology(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<DisplayTopology>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "resolve_topology");
    let context = state.session.context(&trace_id)?;
    let topology = refresh_topology(state, &context.device, &trace_id).ok_or_else(|| {
        AppError::topology_unavailable(
            format!("No display topology could be resolved for {}", context.serial()),
            &trace_id,
        )
    })?;
    Ok(CommandResponse {
        trace_id,
        data: topology,
    })
}

pub fn classify_variant(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Option<VariantTag>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "classify_variant");
    let context = state.session.context(&trace_id)?;
    let variant = variant::classify(
        state.gateway.as_ref(),
        context.serial(),
        state.config.timeouts.probe(),
        &trace_id,
    );
    if variant != context.variant() {
        state.session.select(DeviceInfo {
            variant,
            ..context.device
        });
    }
    Ok(CommandResponse {
        trace_id,
        data: variant,
    })
}

pub fn capture_screenshot(
    display_id: String,
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<u8>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_display_id(&display_id, &trace_id)?;
    info!(trace_id = %trace_id, display_id = %display_id, "capture_screenshot");

    let context = context_with_topology(state, &trace_id)?;
    let request = CaptureRequest {
        serial: context.serial(),
        display_id: &display_id,
        variant: context.variant(),
        physical_id: context.physical_id(&display_id),
    };
    let png = ui_capture::capture(
        state.gateway.as_ref(),
        &request,
        &state.config.capture,
        state.config.timeouts.capture(),
        &trace_id,
    )?;
    Ok(CommandResponse {
        trace_id,
        data: png,
    })
}

/// Never fails once a device is selected; degraded results carry `source` and `error`.
pub fn acquire_hierarchy(
    display_id: String,
    force_accessibility: Option<bool>,
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<HierarchySnapshot>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_display_id(&display_id, &trace_id)?;
    let force_accessibility = force_accessibility.unwrap_or(false);
    info!(
        trace_id = %trace_id,
        display_id = %display_id,
        force_accessibility,
        "acquire_hierarchy"
    );

    let context = context_with_topology(state, &trace_id)?;
    let engine = HierarchyEngine {
        gateway: state.gateway.as_ref(),
        bridge: state.accessibility.as_ref(),
        cache: state.session.cache(),
        config: &state.config,
    };
    let request = HierarchyRequest {
        serial: context.serial(),
        display_id: &display_id,
        force_accessibility,
        resolution: context.resolution(&display_id),
    };
    let snapshot = engine.acquire(&request, &trace_id);
    Ok(CommandResponse {
        trace_id,
        data: snapshot,
    })
}

fn run_input(
    display_id: String,
    action: InputAction,
    state: &AppState,
    trace_id: String,
) -> Result<CommandResponse<InputResult>, AppError> {
    ensure_display_id(&display_id, &trace_id)?;
    let context = state.session.context(&trace_id)?;
    let result = interaction::send_input(
        state.gateway.as_ref(),
        context.serial(),
        &display_id,
        &action,
        state.config.timeouts.shell(),
        &trace_id,
    )?;
    Ok(CommandResponse {
        trace_id,
        data: result,
    })
}

pub fn tap(
    display_id: String,
    x: i32,
    y: i32,
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<InputResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, display_id = %display_id, x, y, "tap");
    run_input(display_id, InputAction::Tap { x, y }, state, trace_id)
}

#[allow(clippy::too_many_arguments)]
pub fn swipe(
    display_id: String,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    duration_ms: u32,
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<InputResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, display_id = %display_id, "swipe");
    run_input(
        display_id,
        InputAction::Swipe {
            x1,
            y1,
            x2,
            y2,
            duration_ms,
        },
        state,
        trace_id,
    )
}

pub fn back(
    display_id: String,
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<InputResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, display_id = %display_id, "back");
    run_input(display_id, InputAction::Back, state, trace_id)
}

pub fn accessibility_status(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<AccessibilityStatus>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "accessibility_status");
    let context = state.session.context(&trace_id)?;
    let status = accessibility::status(
        state.accessibility.as_ref(),
        state.gateway.as_ref(),
        context.serial(),
        &state.config.accessibility,
        state.config.timeouts.probe(),
        &trace_id,
    );
    Ok(CommandResponse {
        trace_id,
        data: status,
    })
}

/// Enables the companion service and reports the resulting status.
pub fn enable_accessibility(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<AccessibilityStatus>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "enable_accessibility");
    let context = state.session.context(&trace_id)?;
    accessibility::enable(
        state.gateway.as_ref(),
        context.serial(),
        &state.config.accessibility,
        state.config.timeouts.shell(),
        &trace_id,
    )?;
    let status = accessibility::status(
        state.accessibility.as_ref(),
        state.gateway.as_ref(),
        context.serial(),
        &state.config.accessibility,
        state.config.timeouts.probe(),
        &trace_id,
    );
    Ok(CommandResponse {
        trace_id,
        data: status,
    })
}

/// Removes the companion service from the enabled list and reports the resulting status.
pub fn disable_accessibility(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<AccessibilityStatus>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "disable_accessibility");
    let context = state.session.context(&trace_id)?;
    accessibility::disable(
        state.gateway.as_ref(),
        context.serial(),
        &state.config.accessibility,
        state.config.timeouts.shell(),
        &trace_id,
    )?;
    let status = accessibility::status(
        state.accessibility.as_ref(),
        state.gateway.as_ref(),
        context.serial(),
        &state.config.accessibility,
        state.config.timeouts.probe(),
        &trace_id,
    );
    Ok(CommandResponse {
        trace_id,
        data: status,
    })
}
