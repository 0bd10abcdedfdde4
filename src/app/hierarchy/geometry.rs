//! Coordinate-space inference for dumped windows.
//!
//! Each decision is a standalone predicate so the policy can be tuned or replaced without
//! touching the transform arithmetic in [`CoordinateTransform`].

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app::models::{HierarchyNode, Rect};

/// Pixel thresholds for the classification predicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoordinateHeuristics {
    /// A window whose origin is within this distance of (0,0) covers the whole display.
    pub full_display_origin_px: i32,
    /// Slack around the window span when testing whether coordinates are already absolute.
    pub absolute_margin_px: i32,
    /// A subtree whose origin is within this distance of (0,0) is window-relative.
    pub relative_origin_px: i32,
}

impl Default for CoordinateHeuristics {
    fn default() -> Self {
        Self {
            full_display_origin_px: 100,
            absolute_margin_px: 200,
            relative_origin_px: 50,
        }
    }
}

pub fn parse_bounds(raw: &str) -> Option<Rect> {
    let pattern = Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").ok()?;
    let caps = pattern.captures(raw.trim())?;
    Some(Rect::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoordinateTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl CoordinateTransform {
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    fn map(value: i32, scale: f64, offset: f64) -> i32 {
        (f64::from(value) * scale + offset).round() as i32
    }

    pub fn apply(&self, rect: &Rect) -> Rect {
        Rect {
            left: Self::map(rect.left, self.scale_x, self.offset_x),
            top: Self::map(rect.top, self.scale_y, self.offset_y),
            right: Self::map(rect.right, self.scale_x, self.offset_x),
            bottom: Self::map(rect.bottom, self.scale_y, self.offset_y),
        }
    }

    pub fn apply_tree(&self, node: &mut HierarchyNode) {
        if self.is_identity() {
            return;
        }
        node.walk_mut(&mut |current| current.bounds = self.apply(&current.bounds));
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbsoluteReason {
    FullDisplayWindow,
    OriginInWindow,
    DescendantInWindow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateSpace {
    Absolute { reason: AbsoluteReason },
    Relative,
    /// Ambiguous geometry; left untouched.
    Unknown,
}

fn within(value: i32, low: i32, high: i32, margin: i32) -> bool {
    low - margin <= value && value <= high + margin
}

fn origin_in_span(rect: &Rect, window: &Rect, margin: i32) -> bool {
    within(rect.left, window.left, window.right, margin)
        && within(rect.top, window.top, window.bottom, margin)
}

pub fn is_full_display_window(window: &Rect, heuristics: &CoordinateHeuristics) -> bool {
    window.left <= heuristics.full_display_origin_px && window.top <= heuristics.full_display_origin_px
}

pub fn source_origin_in_window(
    source: &Rect,
    window: &Rect,
    heuristics: &CoordinateHeuristics,
) -> bool {
    origin_in_span(source, window, heuristics.absolute_margin_px)
}

fn rect_in_span(rect: &Rect, window: &Rect, margin: i32) -> bool {
    origin_in_span(rect, window, margin)
        && within(rect.right, window.left, window.right, margin)
        && within(rect.bottom, window.top, window.bottom, margin)
}

fn anchored_in_window(node: &HierarchyNode, source: &Rect, window: &Rect, margin: i32) -> bool {
    let bounds = &node.bounds;
    if !bounds.is_degenerate() {
        let escapes_source =
            bounds.left > source.right + margin || bounds.top > source.bottom + margin;
        if escapes_source && rect_in_span(bounds, window, margin) {
            return true;
        }
    }
    // Scrolled content overhangs its container even in window-relative trees.
    if node.scrollable {
        return false;
    }
    node.children
        .iter()
        .any(|child| anchored_in_window(child, source, window, margin))
}

/// True when some node lies inside the window span yet beyond anything the roots could
/// reach if the tree were window-relative. Children of scrollable containers are not searched.
pub fn descendant_in_window(
    roots: &[HierarchyNode],
    source: &Rect,
    window: &Rect,
    heuristics: &CoordinateHeuristics,
) -> bool {
    let margin = heuristics.absolute_margin_px;
    roots
        .iter()
        .any(|root| anchored_in_window(root, source, window, margin))
}

pub fn source_near_origin(source: &Rect, heuristics: &CoordinateHeuristics) -> bool {
    source.left <= heuristics.relative_origin_px && source.top <= heuristics.relative_origin_px
}

/// Union of the roots' own rectangles, ignoring roots without geometry.
pub fn source_rect(roots: &[HierarchyNode]) -> Option<Rect> {
    roots
        .iter()
        .map(|root| root.bounds)
        .filter(|bounds| !bounds.is_degenerate())
        .reduce(|acc, bounds| acc.union(&bounds))
}

pub fn classify_window(
    window: &Rect,
    roots: &[HierarchyNode],
    heuristics: &CoordinateHeuristics,
) -> CoordinateSpace {
    if is_full_display_window(window, heuristics) {
        return CoordinateSpace::Absolute {
            reason: AbsoluteReason::FullDisplayWindow,
        };
    }
    let Some(source) = source_rect(roots) else {
        return CoordinateSpace::Unknown;
    };
    if source_origin_in_window(&source, window, heuristics) {
        return CoordinateSpace::Absolute {
            reason: AbsoluteReason::OriginInWindow,
        };
    }
    if descendant_in_window(roots, &source, window, heuristics) {
        return CoordinateSpace::Absolute {
            reason: AbsoluteReason::DescendantInWindow,
        };
    }
    if source_near_origin(&source, heuristics) {
        return CoordinateSpace::Relative;
    }
    CoordinateSpace::Unknown
}

/// Maps the source rectangle onto the window rectangle.
pub fn relative_transform(source: &Rect, window: &Rect) -> CoordinateTransform {
    let scale_x = f64::from(window.width().max(1)) / f64::from(source.width().max(1));
    let scale_y = f64::from(window.height().max(1)) / f64::from(source.height().max(1));
    CoordinateTransform {
        scale_x,
        scale_y,
        offset_x: f64::from(window.left) - f64::from(source.left) * scale_x,
        offset_y: f64::from(window.top) - f64::from(source.top) * scale_y,
    }
}

pub fn derive_transform(
    space: CoordinateSpace,
    window: &Rect,
    roots: &[HierarchyNode],
) -> CoordinateTransform {
    match (space, source_rect(roots)) {
        (CoordinateSpace::Relative, Some(source)) => relative_transform(&source, window),
        _ => CoordinateTransform::identity(),
    }
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
    fn parses_bounds_strings() {
        assert_eq!(parse_bounds("[0,0][1080,1920]"), Some(Rect::new(0, 0, 1080, 1920)));
        assert_eq!(parse_bounds(" [-4,10][20,30] "), Some(Rect::new(-4, 10, 20, 30)));
        assert_eq!(parse_bounds("0,0,10,10"), None);
        assert_eq!(parse_bounds(""), None);
    }

    #[test]
    fn window_near_origin_is_full_display() {
        let heuristics = CoordinateHeuristics::default();
        let roots = vec![node(Rect::new(21, 100, 954, 463), vec![])];
        let space = classify_window(&Rect::new(21, 100, 954, 463), &roots, &heuristics);
        assert_eq!(
            space,
            CoordinateSpace::Absolute {
                reason: AbsoluteReason::FullDisplayWindow
            }
        );
    }

    #[test]
    fn source_inside_window_is_absolute() {
        let heuristics = CoordinateHeuristics::default();
        let window = Rect::new(1906, 80, 2860, 1440);
        let roots = vec![node(Rect::new(1910, 80, 2860, 1440), vec![])];
        assert_eq!(
            classify_window(&window, &roots, &heuristics),
            CoordinateSpace::Absolute {
                reason: AbsoluteReason::OriginInWindow
            }
        );
    }

    #[test]
    fn descendant_beyond_root_proves_absolute() {
        let heuristics = CoordinateHeuristics::default();
        let window = Rect::new(1906, 80, 2860, 1440);
        let roots = vec![node(
            Rect::new(1, 0, 955, 1360),
            vec![node(Rect::new(1926, 374, 2838, 1508), vec![])],
        )];
        let space = classify_window(&window, &roots, &heuristics);
        assert_eq!(
            space,
            CoordinateSpace::Absolute {
                reason: AbsoluteReason::DescendantInWindow
            }
        );
        assert!(derive_transform(space, &window, &roots).is_identity());
    }

    #[test]
    fn carousel_items_past_the_root_stay_relative() {
        let heuristics = CoordinateHeuristics::default();
        let window = Rect::new(1906, 80, 2860, 1440);
        let carousel = HierarchyNode {
            bounds: Rect::new(0, 300, 955, 700),
            scrollable: true,
            children: vec![
                node(Rect::new(0, 300, 955, 700), vec![]),
                node(Rect::new(960, 300, 1915, 700), vec![]),
                node(Rect::new(1920, 300, 2875, 700), vec![]),
            ],
            ..HierarchyNode::default()
        };
        let roots = vec![node(Rect::new(0, 0, 955, 1360), vec![carousel])];
        assert_eq!(
            classify_window(&window, &roots, &heuristics),
            CoordinateSpace::Relative
        );
    }

    #[test]
    fn descendant_overrunning_window_span_is_not_evidence() {
        let heuristics = CoordinateHeuristics::default();
        let window = Rect::new(1906, 80, 2860, 1440);
        let roots = vec![node(
            Rect::new(1, 0, 955, 1360),
            vec![node(Rect::new(2000, 400, 3500, 900), vec![])],
        )];
        let source = source_rect(&roots).expect("source");
        assert!(!descendant_in_window(&roots, &source, &window, &heuristics));
        assert_eq!(
            classify_window(&window, &roots, &heuristics),
            CoordinateSpace::Relative
        );
    }

    #[test]
    fn origin_subtree_is_relative_and_scaled() {
        let heuristics = CoordinateHeuristics::default();
        let window = Rect::new(1920, 200, 2880, 920);
        let roots = vec![node(
            Rect::new(0, 0, 480, 360),
            vec![node(Rect::new(240, 180, 480, 360), vec![])],
        )];
        let space = classify_window(&window, &roots, &heuristics);
        assert_eq!(space, CoordinateSpace::Relative);

        let transform = derive_transform(space, &window, &roots);
        assert_eq!(transform.scale_x, 2.0);
        assert_eq!(transform.scale_y, 2.0);
        assert_eq!(transform.apply(&Rect::new(0, 0, 480, 360)), window);
        assert_eq!(
            transform.apply(&Rect::new(240, 180, 480, 360)),
            Rect::new(2400, 560, 2880, 920)
        );
    }

    #[test]
    fn ambiguous_geometry_is_unknown_with_identity() {
        let heuristics = CoordinateHeuristics::default();
        let window = Rect::new(1906, 80, 2860, 1440);
        let roots = vec![node(Rect::new(600, 700, 900, 900), vec![])];
        let space = classify_window(&window, &roots, &heuristics);
        assert_eq!(space, CoordinateSpace::Unknown);
        assert!(derive_transform(space, &window, &roots).is_identity());
    }

    #[test]
    fn roots_without_geometry_are_unknown() {
        let heuristics = CoordinateHeuristics::default();
        let roots = vec![node(Rect::default(), vec![])];
        assert_eq!(
            classify_window(&Rect::new(500, 500, 900, 900), &roots, &heuristics),
            CoordinateSpace::Unknown
        );
        assert_eq!(source_rect(&roots), None);
    }

    #[test]
    fn source_rect_unions_roots() {
        let roots = vec![
            node(Rect::new(10, 20, 100, 200), vec![]),
            node(Rect::new(50, 5, 300, 150), vec![]),
        ];
        assert_eq!(source_rect(&roots), Some(Rect::new(10, 5, 300, 200)));
    }

    #[test]
    fn heuristics_are_tunable() {
        let strict = CoordinateHeuristics {
            full_display_origin_px: 0,
            ..CoordinateHeuristics::default()
        };
        assert!(!is_full_display_window(&Rect::new(21, 100, 954, 463), &strict));
        assert!(is_full_display_window(
            &Rect::new(21, 100, 954, 463),
            &CoordinateHeuristics::default()
        ));
    }
}
