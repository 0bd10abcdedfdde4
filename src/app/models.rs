use serde::{Deserialize, Serialize};

use crate::app::display::variant::VariantTag;
use crate::app::hierarchy::merge::WindowReport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

impl DeviceSummary {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// The device selected as current for the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: String,
    pub model: Option<String>,
    pub sdk: Option<String>,
    pub variant: Option<VariantTag>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayDescriptor {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub description: String,
}

/// Pixel rectangle; `right`/`bottom` are exclusive edges as reported by the device tools.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.left <= x && x <= self.right && self.top <= y && y <= self.bottom
    }

    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            return 0;
        }
        i64::from(self.width()) * i64::from(self.height())
    }

    pub fn clamp_to(&self, resolution: Resolution) -> Rect {
        let max_x = i32::try_from(resolution.width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(resolution.height).unwrap_or(i32::MAX);
        Rect {
            left: self.left.clamp(0, max_x),
            top: self.top.clamp(0, max_y),
            right: self.right.clamp(0, max_x),
            bottom: self.bottom.clamp(0, max_y),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchyNode {
    pub class_name: String,
    pub package: String,
    pub text: String,
    pub content_desc: String,
    pub resource_id: String,
    pub bounds: Rect,
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
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

impl Default for HierarchyNode {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            package: String::new(),
            text: String::new(),
            content_desc: String::new(),
            resource_id: String::new(),
            bounds: Rect::default(),
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
            children: Vec::new(),
        }
    }
}

impl HierarchyNode {
    /// Nodes that a user can find or act on, even when the dump reports no geometry.
    pub fn is_identifiable(&self) -> bool {
        !self.text.is_empty() || !self.resource_id.is_empty() || self.clickable
    }

    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a HierarchyNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut HierarchyNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// Synthetic root: a display's top-level nodes, without geometry of its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchyTree {
    pub display_id: String,
    pub nodes: Vec<HierarchyNode>,
}

impl HierarchyTree {
    pub fn empty(display_id: impl Into<String>) -> Self {
        Self {
            display_id: display_id.into(),
            nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0usize;
        for node in &self.nodes {
            node.walk(&mut |_| count += 1);
        }
        count
    }

    /// Deepest, then smallest, node whose rectangle contains the point.
    pub fn node_at(&self, x: i32, y: i32) -> Option<&HierarchyNode> {
        fn search<'a>(
            node: &'a HierarchyNode,
            depth: usize,
            x: i32,
            y: i32,
            best: &mut Option<(usize, i64, &'a HierarchyNode)>,
        ) {
            if !node.bounds.is_degenerate() && node.bounds.contains_point(x, y) {
                let area = node.bounds.area();
                let better = match best {
                    None => true,
                    Some((best_depth, best_area, _)) => {
                        depth > *best_depth || (depth == *best_depth && area < *best_area)
                    }
                };
                if better {
                    *best = Some((depth, area, node));
                }
            }
            for child in &node.children {
                search(child, depth + 1, x, y, best);
            }
        }

        let mut best = None;
        for node in &self.nodes {
            search(node, 0, x, y, &mut best);
        }
        best.map(|(_, _, node)| node)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HierarchySource {
    Uiautomator,
    Accessibility,
    Cache,
    Empty,
}

impl HierarchySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchySource::Uiautomator => "uiautomator",
            HierarchySource::Accessibility => "accessibility",
            HierarchySource::Cache => "cache",
            HierarchySource::Empty => "empty",
        }
    }
}

/// Result of a hierarchy acquisition; `error` carries the reason for any degradation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HierarchySnapshot {
    pub tree: HierarchyTree,
    pub source: HierarchySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub windows: Vec<WindowReport>,
    pub captured_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessibilityStatus {
    pub enabled: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputResult {
    pub display_id: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(bounds: Rect, children: Vec<HierarchyNode>) -> HierarchyNode {
        HierarchyNode {
            bounds,
            children,
            ..HierarchyNode::default()
        }
    }

    #[test]
    fn rect_degenerate_and_union() {
        assert!(Rect::new(10, 10, 10, 40).is_degenerate());
        assert!(Rect::default().is_degenerate());
        let union = Rect::new(0, 0, 10, 10).union(&Rect::new(5, -5, 20, 8));
        assert_eq!(union, Rect::new(0, -5, 20, 10));
    }

    #[test]
    fn clamp_keeps_rect_inside_resolution() {
        let clamped = Rect::new(-4, 374, 2838, 1508).clamp_to(Resolution {
            width: 2880,
            height: 1440,
        });
        assert_eq!(clamped, Rect::new(0, 374, 2838, 1440));
    }

    #[test]
    fn node_at_prefers_deepest_match() {
        let tree = HierarchyTree {
            display_id: "0".to_string(),
            nodes: vec![node(
                Rect::new(0, 0, 1000, 1000),
                vec![
                    node(Rect::new(0, 0, 500, 500), vec![node(Rect::new(10, 10, 20, 20), vec![])]),
                    node(Rect::new(500, 500, 1000, 1000), vec![]),
                ],
            )],
        };
        assert_eq!(tree.node_at(15, 15).map(|n| n.bounds), Some(Rect::new(10, 10, 20, 20)));
        assert_eq!(tree.node_at(700, 700).map(|n| n.bounds), Some(Rect::new(500, 500, 1000, 1000)));
        assert!(tree.node_at(5000, 5000).is_none());
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn hierarchy_source_serializes_lowercase() {
        let value = serde_json::to_value(HierarchySource::Uiautomator).expect("serialize");
        assert_eq!(value, "uiautomator");
        assert_eq!(HierarchySource::Cache.as_str(), "cache");
    }
}
