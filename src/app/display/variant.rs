use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::adb::gateway::DeviceGateway;
use crate::app::adb::parse::parse_single_value;

/// Build property whose value names the head-unit family.
pub const VARIANT_PROPERTY: &str = "ro.build.display.id";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VariantTag {
    #[serde(rename = "SS2")]
    Ss2,
    #[serde(rename = "SS3")]
    Ss3,
    #[serde(rename = "SS4")]
    Ss4,
    #[serde(rename = "SS5")]
    Ss5,
}

impl VariantTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantTag::Ss2 => "SS2",
            VariantTag::Ss3 => "SS3",
            VariantTag::Ss4 => "SS4",
            VariantTag::Ss5 => "SS5",
        }
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first marker found wins.
const VARIANT_MARKERS: [(&str, VariantTag); 4] = [
    ("SS4", VariantTag::Ss4),
    ("SS3", VariantTag::Ss3),
    ("SS2", VariantTag::Ss2),
    ("SS5", VariantTag::Ss5),
];

pub fn classify_build_string(value: &str) -> Option<VariantTag> {
    let upper = value.to_uppercase();
    VARIANT_MARKERS
        .iter()
        .find(|(marker, _)| upper.contains(marker))
        .map(|(_, tag)| *tag)
}

/// Reads the build property and classifies it. Read failures classify as unknown.
pub fn classify(
    gateway: &dyn DeviceGateway,
    serial: &str,
    timeout: Duration,
    trace_id: &str,
) -> Option<VariantTag> {
    let output = match gateway.shell_text(
        serial,
        &format!("getprop {VARIANT_PROPERTY}"),
        timeout,
        trace_id,
    ) {
        Ok(output) => output,
        Err(err) => {
            warn!(trace_id = %trace_id, serial = %serial, error = %err.error, "variant probe failed");
            return None;
        }
    };
    let value = parse_single_value(&output)?;
    let variant = classify_build_string(&value);
    debug!(
        trace_id = %trace_id,
        serial = %serial,
        build = %value,
        variant = ?variant,
        "classified device variant"
    );
    variant
}
