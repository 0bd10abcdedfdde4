use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::adb::gateway::DeviceGateway;
use crate::app::adb::parse::parse_component_list;
use crate::app::config::AccessibilitySettings;
use crate::app::error::AppError;
use crate::app::models::{AccessibilityStatus, HierarchyNode, Rect};

pub const ENABLED_SERVICES_SETTING: &str = "enabled_accessibility_services";
pub const ACCESSIBILITY_ENABLED_SETTING: &str = "accessibility_enabled";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccessibilityBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl AccessibilityBounds {
    pub fn to_rect(self) -> Rect {
        Rect::new(self.left, self.top, self.right, self.bottom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessibilityWindow {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub window_type: i32,
    pub display_id: i32,
    pub bounds: AccessibilityBounds,
}

/// Node record as served by the companion app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessibilityNode {
    pub class_name: String,
    pub package_name: String,
    pub text: String,
    pub content_description: String,
    pub resource_id: String,
    pub bounds: AccessibilityBounds,
    pub clickable: bool,
    pub long_clickable: bool,
    pub enabled: bool,
    pub focusable: bool,
    pub focused: bool,
    pub selected: bool,
    pub checkable: bool,
    pub checked: bool,
    pub scrollable: bool,
    pub visible_to_user: bool,
    pub window: Option<AccessibilityWindow>,
    pub children: Vec<AccessibilityNode>,
    pub depth: u32,
}

impl Default for AccessibilityNode {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            package_name: String::new(),
            text: String::new(),
            content_description: String::new(),
            resource_id: String::new(),
            bounds: AccessibilityBounds::default(),
            clickable: false,
            long_clickable: false,
            enabled: true,
            focusable: false,
            focused: false,
            selected: false,
            checkable: false,
            checked: false,
            scrollable: false,
            visible_to_user: true,
            window: None,
            children: Vec::new(),
            depth: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HierarchyResponse {
    pub success: bool,
    pub error: Option<String>,
    pub nodes: Vec<AccessibilityNode>,
}

/// Display offset carried by the window rectangles, when it exceeds the threshold on either axis.
pub fn origin_offset(nodes: &[AccessibilityNode], threshold: i32) -> Option<(i32, i32)> {
    let mut windows = nodes
        .iter()
        .filter_map(|node| node.window.as_ref())
        .map(|window| window.bounds);
    let first = windows.next()?;
    let (left, top) = windows.fold((first.left, first.top), |(left, top), bounds| {
        (left.min(bounds.left), top.min(bounds.top))
    });
    (left > threshold || top > threshold).then_some((left, top))
}

fn shift(rect: Rect, (dx, dy): (i32, i32)) -> Rect {
    Rect {
        left: (rect.left - dx).max(0),
        top: (rect.top - dy).max(0),
        right: (rect.right - dx).max(0),
        bottom: (rect.bottom - dy).max(0),
    }
}

fn convert_node(node: AccessibilityNode, offset: Option<(i32, i32)>) -> HierarchyNode {
    let bounds = node.bounds.to_rect();
    HierarchyNode {
        class_name: node.class_name,
        package: node.package_name,
        text: node.text,
        content_desc: node.content_description,
        resource_id: node.resource_id,
        bounds: offset.map_or(bounds, |offset| shift(bounds, offset)),
        clickable: node.clickable,
        long_clickable: node.long_clickable,
        enabled: node.enabled,
        focusable: node.focusable,
        focused: node.focused,
        selected: node.selected,
        checkable: node.checkable,
        checked: node.checked,
        scrollable: node.scrollable,
        visible_to_user: node.visible_to_user,
        children: node
            .children
            .into_iter()
            .map(|child| convert_node(child, offset))
            .collect(),
    }
}

pub fn convert_nodes(nodes: Vec<AccessibilityNode>, threshold: i32) -> Vec<HierarchyNode> {
    let offset = origin_offset(&nodes, threshold);
    if let Some((dx, dy)) = offset {
        debug!(dx, dy, "removing display offset from accessibility rects");
    }
    nodes
        .into_iter()
        .map(|node| convert_node(node, offset))
        .collect()
}

/// Source of accessibility trees; the HTTP client in production, a fake in tests.
pub trait AccessibilityBridge: Send + Sync {
    fn is_running(&self, gateway: &dyn DeviceGateway, serial: &str, trace_id: &str) -> bool;

    fn fetch_nodes(
        &self,
        gateway: &dyn DeviceGateway,
        serial: &str,
        display_id: &str,
        trace_id: &str,
    ) -> Result<Vec<AccessibilityNode>, String>;
}

pub struct AccessibilityClient {
    settings: AccessibilitySettings,
    timeout: Duration,
}

impl AccessibilityClient {
    pub fn new(settings: AccessibilitySettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.settings.local_port)
    }

    fn http(&self) -> Result<reqwest::blocking::Client, String> {
        // The service is only reachable through the local forward; host proxies must not apply.
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build()
            .map_err(|err| format!("Failed to build HTTP client: {err}"))
    }

    // Forwards silently disappear when adb restarts, so every use re-establishes one.
    fn ensure_forward(
        &self,
        gateway: &dyn DeviceGateway,
        serial: &str,
        trace_id: &str,
    ) -> Result<(), String> {
        gateway
            .forward(
                serial,
                self.settings.local_port,
                self.settings.device_port,
                trace_id,
            )
            .map_err(|err| err.error)
    }

    fn check_status(&self, client: &reqwest::blocking::Client) -> Result<(), String> {
        let response = client
            .get(format!("{}/api/status", self.base_url()))
            .send()
            .map_err(|err| format!("accessibility service unreachable: {err}"))?;
        if !response.status().is_success() {
            return Err(format!("accessibility status returned {}", response.status()));
        }
        Ok(())
    }
}

impl AccessibilityBridge for AccessibilityClient {
    fn is_running(&self, gateway: &dyn DeviceGateway, serial: &str, trace_id: &str) -> bool {
        let result = self
            .ensure_forward(gateway, serial, trace_id)
            .and_then(|_| self.http())
            .and_then(|client| self.check_status(&client));
        if let Err(err) = &result {
            debug!(trace_id = %trace_id, serial = %serial, error = %err, "accessibility status check failed");
        }
        result.is_ok()
    }

    fn fetch_nodes(
        &self,
        gateway: &dyn DeviceGateway,
        serial: &str,
        display_id: &str,
        trace_id: &str,
    ) -> Result<Vec<AccessibilityNode>, String> {
        self.ensure_forward(gateway, serial, trace_id)?;
        let client = self.http()?;
        self.check_status(&client)?;
        let response = client
            .get(format!("{}/api/hierarchy", self.base_url()))
            .query(&[("display", display_id)])
            .send()
            .map_err(|err| format!("accessibility hierarchy request failed: {err}"))?;
        if !response.status().is_success() {
            return Err(format!(
                "accessibility hierarchy returned {}",
                response.status()
            ));
        }
        let payload: HierarchyResponse = response
            .json()
            .map_err(|err| format!("invalid accessibility payload: {err}"))?;
        if !payload.success {
            return Err(payload
                .error
                .unwrap_or_else(|| "accessibility service reported failure".to_string()));
        }
        Ok(payload.nodes)
    }
}

/// Accessibility path of the hierarchy engine: fetched nodes in display coordinates.
pub fn acquire(
    bridge: &dyn AccessibilityBridge,
    gateway: &dyn DeviceGateway,
    serial: &str,
    display_id: &str,
    settings: &AccessibilitySettings,
    trace_id: &str,
) -> Result<Vec<HierarchyNode>, String> {
    let nodes = bridge.fetch_nodes(gateway, serial, display_id, trace_id)?;
    if nodes.is_empty() {
        return Err(format!("accessibility service returned no nodes for display {display_id}"));
    }
    Ok(convert_nodes(nodes, settings.offset_threshold_px))
}

/// `pkg/.Cls` and `pkg/pkg.Cls` name the same component.
fn expand_component(component: &str) -> String {
    match component.split_once('/') {
        Some((package, class)) if class.starts_with('.') => format!("{package}/{package}{class}"),
        _ => component.to_string(),
    }
}

pub fn component_listed(services: &[String], component: &str) -> bool {
    let wanted = expand_component(component);
    services
        .iter()
        .any(|service| expand_component(service) == wanted)
}

fn read_enabled_services(
    gateway: &dyn DeviceGateway,
    serial: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<String>, AppError> {
    let output = gateway.shell_text(
        serial,
        &format!("settings get secure {ENABLED_SERVICES_SETTING}"),
        timeout,
        trace_id,
    )?;
    Ok(parse_component_list(&output))
}

pub fn status(
    bridge: &dyn AccessibilityBridge,
    gateway: &dyn DeviceGateway,
    serial: &str,
    settings: &AccessibilitySettings,
    timeout: Duration,
    trace_id: &str,
) -> AccessibilityStatus {
    let (enabled, error) = match read_enabled_services(gateway, serial, timeout, trace_id) {
        Ok(services) => (component_listed(&services, &settings.service_component), None),
        Err(err) => (false, Some(err.error)),
    };
    let running = bridge.is_running(gateway, serial, trace_id);
    AccessibilityStatus {
        enabled,
        running,
        error,
    }
}

/// Adds the companion service to the enabled list and switches accessibility on.
pub fn enable(
    gateway: &dyn DeviceGateway,
    serial: &str,
    settings: &AccessibilitySettings,
    timeout: Duration,
    trace_id: &str,
) -> Result<(), AppError> {
    let mut services = read_enabled_services(gateway, serial, timeout, trace_id)?;
    if component_listed(&services, &settings.service_component) {
        debug!(trace_id = %trace_id, serial = %serial, "accessibility service already listed");
    } else {
        services.push(settings.service_component.clone());
        let joined = services.join(":");
        gateway.shell(
            serial,
            &format!("settings put secure {ENABLED_SERVICES_SETTING} {joined}"),
            timeout,
            trace_id,
        )?;
    }
    gateway.shell(
        serial,
        &format!("settings put secure {ACCESSIBILITY_ENABLED_SETTING} 1"),
        timeout,
        trace_id,
    )?;
    info!(
        trace_id = %trace_id,
        serial = %serial,
        component = %settings.service_component,
        "enabled accessibility service"
    );
    Ok(())
}

/// Removes the companion service from the enabled list. Accessibility is switched off only
/// when no other service remains enabled.
pub fn disable(
    gateway: &dyn DeviceGateway,
    serial: &str,
    settings: &AccessibilitySettings,
    timeout: Duration,
    trace_id: &str,
) -> Result<(), AppError> {
    let services = read_enabled_services(gateway, serial, timeout, trace_id)?;
    let wanted = expand_component(&settings.service_component);
    let remaining: Vec<String> = services
        .iter()
        .filter(|service| expand_component(service) != wanted)
        .cloned()
        .collect();
    if remaining.len() == services.len() {
        debug!(trace_id = %trace_id, serial = %serial, "accessibility service not listed");
    } else if remaining.is_empty() {
        gateway.shell(
            serial,
            &format!("settings delete secure {ENABLED_SERVICES_SETTING}"),
            timeout,
            trace_id,
        )?;
    } else {
        gateway.shell(
            serial,
            &format!(
                "settings put secure {ENABLED_SERVICES_SETTING} {}",
                remaining.join(":")
            ),
            timeout,
            trace_id,
        )?;
    }
    if remaining.is_empty() {
        gateway.shell(
            serial,
            &format!("settings put secure {ACCESSIBILITY_ENABLED_SETTING} 0"),
            timeout,
            trace_id,
        )?;
    }
    info!(
        trace_id = %trace_id,
        serial = %serial,
        component = %settings.service_component,
        remaining = remaining.len(),
        "disabled accessibility service"
    );
    Ok(())
}
