use crate::app::models::DeviceSummary;

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let mut summary = DeviceSummary {
                serial: tokens[0].to_string(),
                state: tokens[1].to_string(),
                model: None,
                product: None,
                device: None,
                transport_id: None,
            };
            for token in tokens.iter().skip(2) {
                if let Some(value) = token.strip_prefix("model:") {
                    summary.model = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("product:") {
                    summary.product = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("device:") {
                    summary.device = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("transport_id:") {
                    summary.transport_id = Some(value.to_string());
                }
            }
            Some(summary)
        })
        .collect()
}

/// First non-empty line of a single-value read such as `getprop <key>` or `settings get`.
pub fn parse_single_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .filter(|line| *line != "null")
        .map(|line| line.to_string())
}

/// `enabled_accessibility_services` is a colon-separated list of component names.
pub fn parse_component_list(output: &str) -> Vec<String> {
    parse_single_value(output)
        .map(|value| {
            value
                .split(':')
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .map(|item| item.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Interprets `adb connect` output, which exits 0 even when the connection failed.
pub fn parse_connect_output(output: &str) -> Result<(), String> {
    let lowered = output.to_lowercase();
    if lowered.contains("connected to") && !lowered.contains("cannot") {
        return Ok(());
    }
    let message = output.trim();
    if message.is_empty() {
        return Err("adb connect returned no output".to_string());
    }
    Err(message.to_string())
}
