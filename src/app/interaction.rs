use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::adb::gateway::DeviceGateway;
use crate::app::error::AppError;
use crate::app::models::InputResult;

pub const KEYCODE_BACK: u32 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InputAction {
    Tap {
        x: i32,
        y: i32,
    },
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    },
    Back,
}

impl InputAction {
    pub fn validate(&self) -> Result<(), String> {
        let coordinates: Vec<i32> = match self {
            InputAction::Tap { x, y } => vec![*x, *y],
            InputAction::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => {
                if !(1..=60_000).contains(duration_ms) {
                    return Err("duration_ms must be between 1 and 60000".to_string());
                }
                vec![*x1, *y1, *x2, *y2]
            }
            InputAction::Back => Vec::new(),
        };
        if coordinates.iter().any(|value| *value < 0) {
            return Err("coordinates must be non-negative".to_string());
        }
        Ok(())
    }
}

/// `input` command for a logical display; display 0 needs no `-d`.
pub fn input_command(display_id: &str, action: &InputAction) -> String {
    let prefix = if display_id == "0" {
        "input".to_string()
    } else {
        format!("input -d {display_id}")
    };
    match action {
        InputAction::Tap { x, y } => format!("{prefix} tap {x} {y}"),
        InputAction::Swipe {
            x1,
            y1,
            x2,
            y2,
            duration_ms,
        } => format!("{prefix} swipe {x1} {y1} {x2} {y2} {duration_ms}"),
        InputAction::Back => format!("{prefix} keyevent {KEYCODE_BACK}"),
    }
}

pub fn send_input(
    gateway: &dyn DeviceGateway,
    serial: &str,
    display_id: &str,
    action: &InputAction,
    timeout: Duration,
    trace_id: &str,
) -> Result<InputResult, AppError> {
    action
        .validate()
        .map_err(|message| AppError::validation(message, trace_id))?;
    let command = input_command(display_id, action);
    let output = gateway.shell_text(serial, &command, timeout, trace_id)?;
    let trimmed = output.trim();
    if trimmed.contains("Exception") || trimmed.to_lowercase().starts_with("error") {
        return Err(AppError::dependency(
            format!("`{command}` failed: {trimmed}"),
            trace_id,
        ));
    }
    info!(
        trace_id = %trace_id,
        serial = %serial,
        display_id = %display_id,
        command = %command,
        "sent input"
    );
    Ok(InputResult {
        display_id: display_id.to_string(),
        command,
    })
}
