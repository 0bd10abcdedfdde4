use chrono::Utc;
use tracing::{info, warn};

use crate::app::adb::gateway::DeviceGateway;
use crate::app::config::InspectorConfig;
use crate::app::fallback::{Failure, FallbackChain};
use crate::app::hierarchy::accessibility::{self, AccessibilityBridge};
use crate::app::hierarchy::cache::HierarchyCache;
use crate::app::hierarchy::merge::{finalize, MergeOptions, WindowReport};
use crate::app::hierarchy::uiautomator;
use crate::app::models::{
    HierarchyNode, HierarchySnapshot, HierarchySource, HierarchyTree, Resolution,
};

#[derive(Debug, Clone, Copy)]
pub struct HierarchyRequest<'a> {
    pub serial: &'a str,
    pub display_id: &'a str,
    pub force_accessibility: bool,
    pub resolution: Option<Resolution>,
}

struct LiveHierarchy {
    nodes: Vec<HierarchyNode>,
    windows: Vec<WindowReport>,
    source: HierarchySource,
}

fn describe(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.label, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Degrade chain over the live sources, then the cache, then an empty tree. Never fails.
pub struct HierarchyEngine<'a> {
    pub gateway: &'a dyn DeviceGateway,
    pub bridge: &'a dyn AccessibilityBridge,
    pub cache: &'a HierarchyCache,
    pub config: &'a InspectorConfig,
}

impl<'a> HierarchyEngine<'a> {
    pub fn acquire(&self, request: &HierarchyRequest<'_>, trace_id: &str) -> HierarchySnapshot {
        let options = MergeOptions {
            heuristics: &self.config.hierarchy.coordinates,
            resolution: request.resolution,
            clamp_to_display: self.config.hierarchy.clamp_to_display,
        };

        let mut chain: FallbackChain<'_, LiveHierarchy> = FallbackChain::new("hierarchy");
        if request.force_accessibility {
            chain.push(HierarchySource::Accessibility.as_str(), || {
                let mut nodes = accessibility::acquire(
                    self.bridge,
                    self.gateway,
                    request.serial,
                    request.display_id,
                    &self.config.accessibility,
                    trace_id,
                )?;
                finalize(&mut nodes, &options);
                Ok(LiveHierarchy {
                    nodes,
                    windows: Vec::new(),
                    source: HierarchySource::Accessibility,
                })
            });
        }
        chain.push(HierarchySource::Uiautomator.as_str(), || {
            let outcome = uiautomator::acquire(
                self.gateway,
                request.serial,
                request.display_id,
                &options,
                &self.config.hierarchy,
                self.config.timeouts.dump(),
                trace_id,
            )?;
            Ok(LiveHierarchy {
                nodes: outcome.nodes,
                windows: outcome.windows,
                source: HierarchySource::Uiautomator,
            })
        });

        match chain.run(trace_id) {
            Ok(resolved) => {
                let live = resolved.value;
                let tree = HierarchyTree {
                    display_id: request.display_id.to_string(),
                    nodes: live.nodes,
                };
                let captured_at = Utc::now().to_rfc3339();
                self.cache
                    .put(request.display_id, tree.clone(), captured_at.clone());
                info!(
                    trace_id = %trace_id,
                    display_id = %request.display_id,
                    source = live.source.as_str(),
                    nodes = tree.node_count(),
                    "acquired hierarchy"
                );
                let error = (!resolved.failures.is_empty()).then(|| describe(&resolved.failures));
                HierarchySnapshot {
                    tree,
                    source: live.source,
                    error,
                    windows: live.windows,
                    captured_at,
                }
            }
            Err(exhausted) => {
                let error = describe(&exhausted.failures);
                if let Some(cached) = self.cache.get(request.display_id) {
                    warn!(
                        trace_id = %trace_id,
                        display_id = %request.display_id,
                        error = %error,
                        "serving cached hierarchy"
                    );
                    return HierarchySnapshot {
                        tree: cached.tree,
                        source: HierarchySource::Cache,
                        error: Some(error),
                        windows: Vec::new(),
                        captured_at: cached.captured_at,
                    };
                }
                warn!(
                    trace_id = %trace_id,
                    display_id = %request.display_id,
                    error = %error,
                    "no hierarchy available"
                );
                HierarchySnapshot {
                    tree: HierarchyTree::empty(request.display_id),
                    source: HierarchySource::Empty,
                    error: Some(error),
                    windows: Vec::new(),
                    captured_at: Utc::now().to_rfc3339(),
                }
            }
        }
    }
}
