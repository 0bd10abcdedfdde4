use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::adb::gateway::DeviceGateway;
use crate::app::models::{DisplayDescriptor, Resolution};

pub const SURFACE_FLINGER_DUMP: &str = "dumpsys SurfaceFlinger --display-id";
pub const DISPLAY_MANAGER_DUMP: &str = "dumpsys display";
const DISPLAY_DEVICE_DELIMITER: &str = "Display Device ";

/// Logical to physical display mapping for the current device, keyed by logical id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayTopology {
    pub logical_to_physical: BTreeMap<String, String>,
    pub descriptors: Vec<DisplayDescriptor>,
}

impl DisplayTopology {
    pub fn from_descriptors(descriptors: Vec<DisplayDescriptor>) -> Self {
        let logical_to_physical = descriptors
            .iter()
            .filter_map(|descriptor| {
                descriptor
                    .physical_id
                    .as_ref()
                    .map(|physical| (descriptor.id.clone(), physical.clone()))
            })
            .collect();
        Self {
            logical_to_physical,
            descriptors,
        }
    }

    pub fn physical_id(&self, logical: &str) -> Option<&str> {
        self.logical_to_physical.get(logical).map(String::as_str)
    }

    pub fn resolution(&self, logical: &str) -> Option<Resolution> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.id == logical)
            .and_then(|descriptor| descriptor.resolution)
    }
}

/// Physical display id to display name, from the SurfaceFlinger dump.
pub fn parse_surface_flinger_names(output: &str) -> HashMap<String, String> {
    let Ok(pattern) = Regex::new(r#"Display (\d{10,20}) .*?displayName="([^"]+)""#) else {
        return HashMap::new();
    };
    pattern
        .captures_iter(output)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

// Seat table shared by every head-unit family.
fn seat_label(logical: &str) -> Option<&'static str> {
    match logical {
        "0" => Some("Main Driver"),
        "2" => Some("Passenger"),
        "4" => Some("Rear Left"),
        "5" => Some("Rear Right"),
        _ => None,
    }
}

pub fn display_label(logical: &str, name: &str) -> String {
    match seat_label(logical) {
        Some(seat) => format!("{seat} ({name})"),
        None => name.to_string(),
    }
}

/// Descriptors from the display-manager dump. A block contributes only when both its logical
/// and physical ids are present.
pub fn parse_display_devices(
    output: &str,
    names: &HashMap<String, String>,
) -> Vec<DisplayDescriptor> {
    let (Ok(logical_re), Ok(physical_re), Ok(resolution_re)) = (
        Regex::new(r"mDisplayId=(\d+)"),
        Regex::new(r"mUniqueId=local:(\d{10,20})"),
        Regex::new(r"(\d+) x (\d+),"),
    ) else {
        return Vec::new();
    };

    output
        .split(DISPLAY_DEVICE_DELIMITER)
        .skip(1)
        .filter_map(|block| {
            let logical = logical_re.captures(block)?[1].to_string();
            let physical = physical_re.captures(block)?[1].to_string();
            let resolution = resolution_re.captures(block).and_then(|caps| {
                Some(Resolution {
                    width: caps[1].parse().ok()?,
                    height: caps[2].parse().ok()?,
                })
            });
            let name = names
                .get(&physical)
                .cloned()
                .unwrap_or_else(|| format!("Display {logical}"));
            let mut description = display_label(&logical, &name);
            if let Some(resolution) = resolution {
                description.push_str(&format!(" ({}x{})", resolution.width, resolution.height));
            }
            Some(DisplayDescriptor {
                id: logical,
                physical_id: Some(physical),
                resolution,
                description,
            })
        })
        .collect()
}

pub fn build_topology(surface_flinger: &str, display_manager: &str) -> Option<DisplayTopology> {
    let names = parse_surface_flinger_names(surface_flinger);
    let descriptors = parse_display_devices(display_manager, &names);
    if descriptors.is_empty() {
        return None;
    }
    Some(DisplayTopology::from_descriptors(descriptors))
}

/// Best-effort: any dump failure or an unusable dump yields `None`, never an error.
pub fn resolve(
    gateway: &dyn DeviceGateway,
    serial: &str,
    timeout: Duration,
    trace_id: &str,
) -> Option<DisplayTopology> {
    let dumps = gateway
        .shell_text(serial, SURFACE_FLINGER_DUMP, timeout, trace_id)
        .and_then(|surface_flinger| {
            gateway
                .shell_text(serial, DISPLAY_MANAGER_DUMP, timeout, trace_id)
                .map(|display_manager| (surface_flinger, display_manager))
        });
    let (surface_flinger, display_manager) = match dumps {
        Ok(dumps) => dumps,
        Err(err) => {
            warn!(trace_id = %trace_id, serial = %serial, error = %err.error, "display dumps failed");
            return None;
        }
    };

    let topology = build_topology(&surface_flinger, &display_manager);
    match &topology {
        Some(topology) => info!(
            trace_id = %trace_id,
            serial = %serial,
            displays = topology.descriptors.len(),
            "resolved display topology"
        ),
        None => warn!(trace_id = %trace_id, serial = %serial, "no display blocks matched"),
    }
    topology
}

/// Seat list offered when the device dumps cannot be resolved.
pub fn fallback_descriptors() -> Vec<DisplayDescriptor> {
    [
        ("0", "Display 0 (Main)"),
        ("2", "Display 2 (Passenger)"),
        ("4", "Display 4 (Rear L)"),
        ("5", "Display 5 (Rear R)"),
    ]
    .into_iter()
    .map(|(id, description)| DisplayDescriptor {
        id: id.to_string(),
        physical_id: None,
        resolution: None,
        description: description.to_string(),
    })
    .collect()
}
