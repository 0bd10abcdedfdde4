use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::hierarchy::geometry::{
    classify_window, derive_transform, CoordinateHeuristics, CoordinateSpace, CoordinateTransform,
};
use crate::app::hierarchy::ui_xml::{DumpDocument, WindowDump};
use crate::app::models::{HierarchyNode, Rect, Resolution};

/// One window's roots together with its declared rectangle, for a single display.
#[derive(Debug, Clone)]
pub struct WindowFrame {
    pub title: String,
    pub window_type: String,
    pub bounds: Rect,
    pub roots: Vec<HierarchyNode>,
}

/// How a merged window was interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowReport {
    pub title: String,
    pub window_type: String,
    pub bounds: Rect,
    pub space: CoordinateSpace,
    pub transform: CoordinateTransform,
    pub node_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub nodes: Vec<HierarchyNode>,
    pub windows: Vec<WindowReport>,
}

#[derive(Debug, Clone)]
pub struct MergeOptions<'a> {
    pub heuristics: &'a CoordinateHeuristics,
    pub resolution: Option<Resolution>,
    pub clamp_to_display: bool,
}

/// Windows of `display_id` only; other displays never contribute geometry.
pub fn frames_for_display(document: DumpDocument, display_id: &str) -> Vec<WindowFrame> {
    let DumpDocument::Displays(displays) = document else {
        return Vec::new();
    };
    displays
        .into_iter()
        .filter(|display| display.id == display_id)
        .flat_map(|display| display.windows)
        .map(frame_from_window)
        .collect()
}

fn frame_from_window(window: WindowDump) -> WindowFrame {
    let WindowDump {
        title,
        window_type,
        bounds,
        roots,
    } = window;
    WindowFrame {
        title,
        window_type,
        bounds: bounds.unwrap_or_default(),
        roots,
    }
}

fn count_nodes(roots: &[HierarchyNode]) -> usize {
    let mut count = 0usize;
    for root in roots {
        root.walk(&mut |_| count += 1);
    }
    count
}

pub fn normalize_frame(
    frame: WindowFrame,
    heuristics: &CoordinateHeuristics,
) -> (Vec<HierarchyNode>, WindowReport) {
    let WindowFrame {
        title,
        window_type,
        bounds,
        mut roots,
    } = frame;
    let space = if bounds.is_degenerate() {
        CoordinateSpace::Unknown
    } else {
        classify_window(&bounds, &roots, heuristics)
    };
    let transform = derive_transform(space, &bounds, &roots);
    for root in &mut roots {
        transform.apply_tree(root);
    }
    let report = WindowReport {
        title,
        window_type,
        bounds,
        space,
        transform,
        node_count: count_nodes(&roots),
    };
    (roots, report)
}

/// Gives identifiable zero-area nodes the rectangle of their nearest ancestor with geometry.
pub fn repair_zero_rects(node: &mut HierarchyNode, ancestor: Option<Rect>) {
    if node.bounds.is_degenerate() && node.is_identifiable() {
        if let Some(rect) = ancestor {
            node.bounds = rect;
        }
    }
    let inherited = if node.bounds.is_degenerate() {
        ancestor
    } else {
        Some(node.bounds)
    };
    for child in &mut node.children {
        repair_zero_rects(child, inherited);
    }
}

pub fn clamp_tree(node: &mut HierarchyNode, resolution: Resolution) {
    node.walk_mut(&mut |current| current.bounds = current.bounds.clamp_to(resolution));
}

/// Zero-rect repair then, when enabled and the resolution is known, clamping.
pub fn finalize(nodes: &mut [HierarchyNode], options: &MergeOptions<'_>) {
    for node in nodes.iter_mut() {
        repair_zero_rects(node, None);
    }
    if !options.clamp_to_display {
        return;
    }
    if let Some(resolution) = options.resolution {
        for node in nodes.iter_mut() {
            clamp_tree(node, resolution);
        }
    }
}

/// Turns a parsed dump into display-coordinate nodes for one logical display.
pub fn merge_dump(
    document: DumpDocument,
    display_id: &str,
    options: &MergeOptions<'_>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    match document {
        DumpDocument::Flat(roots) => outcome.nodes = roots,
        document @ DumpDocument::Displays(_) => {
            for frame in frames_for_display(document, display_id) {
                let (roots, report) = normalize_frame(frame, options.heuristics);
                debug!(
                    display_id = %display_id,
                    window = %report.title,
                    space = ?report.space,
                    nodes = report.node_count,
                    "merged window"
                );
                outcome.nodes.extend(roots);
                outcome.windows.push(report);
            }
        }
    }
    finalize(&mut outcome.nodes, options);
    outcome
}
