use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::app::hierarchy::geometry::parse_bounds;
use crate::app::models::{HierarchyNode, Rect};

/// A structural dump as written by `uiautomator dump`.
#[derive(Debug, Clone, PartialEq)]
pub enum DumpDocument {
    /// Single `<hierarchy>` already in display coordinates.
    Flat(Vec<HierarchyNode>),
    /// `<displays>` container with per-display windows.
    Displays(Vec<DisplayDump>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayDump {
    pub id: String,
    pub windows: Vec<WindowDump>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowDump {
    pub title: String,
    pub window_type: String,
    pub bounds: Option<Rect>,
    pub roots: Vec<HierarchyNode>,
}

impl DumpDocument {
    pub fn node_count(&self) -> usize {
        let count_roots = |roots: &[HierarchyNode]| {
            let mut count = 0usize;
            for root in roots {
                root.walk(&mut |_| count += 1);
            }
            count
        };
        match self {
            DumpDocument::Flat(roots) => count_roots(roots),
            DumpDocument::Displays(displays) => displays
                .iter()
                .flat_map(|display| display.windows.iter())
                .map(|window| count_roots(&window.roots))
                .sum(),
        }
    }
}

/// Slices the XML document out of shell output that may carry status lines around it.
pub fn extract_xml_payload(output: &str) -> Option<&str> {
    let start = output.find('<')?;
    let end = output.rfind('>')?;
    if end <= start {
        return None;
    }
    Some(&output[start..=end])
}

fn attr_map(element: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut attrs = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|err| format!("attribute error: {err}"))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map(|value| value.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
        attrs.push((key, value));
    }
    Ok(attrs)
}

fn find_attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(attr_name, _)| attr_name == name)
        .map(|(_, value)| value.as_str())
}

fn text_attr(attrs: &[(String, String)], name: &str) -> String {
    find_attr(attrs, name).unwrap_or_default().to_string()
}

fn bool_attr(attrs: &[(String, String)], name: &str, default: bool) -> bool {
    match find_attr(attrs, name) {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => default,
    }
}

fn node_from_attrs(attrs: &[(String, String)]) -> HierarchyNode {
    HierarchyNode {
        class_name: text_attr(attrs, "class"),
        package: text_attr(attrs, "package"),
        text: text_attr(attrs, "text"),
        content_desc: text_attr(attrs, "content-desc"),
        resource_id: text_attr(attrs, "resource-id"),
        bounds: find_attr(attrs, "bounds")
            .and_then(parse_bounds)
            .unwrap_or_default(),
        clickable: bool_attr(attrs, "clickable", false),
        long_clickable: bool_attr(attrs, "long-clickable", false),
        enabled: bool_attr(attrs, "enabled", true),
        focusable: bool_attr(attrs, "focusable", false),
        focused: bool_attr(attrs, "focused", false),
        selected: bool_attr(attrs, "selected", false),
        checkable: bool_attr(attrs, "checkable", false),
        checked: bool_attr(attrs, "checked", false),
        scrollable: bool_attr(attrs, "scrollable", false),
        visible_to_user: bool_attr(attrs, "visible-to-user", true),
        children: Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Hierarchy,
    Displays,
}

#[derive(Default)]
struct DumpBuilder {
    root: Option<RootKind>,
    open_nodes: Vec<HierarchyNode>,
    roots: Vec<HierarchyNode>,
    window: Option<WindowDump>,
    display: Option<DisplayDump>,
    displays: Vec<DisplayDump>,
    flat: Vec<HierarchyNode>,
}

impl DumpBuilder {
    fn close_node(&mut self, node: HierarchyNode) {
        match self.open_nodes.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn flush_roots(&mut self) {
        let roots = std::mem::take(&mut self.roots);
        match self.window.as_mut() {
            Some(window) => window.roots.extend(roots),
            None => self.flat.extend(roots),
        }
    }

    fn open(&mut self, element: &BytesStart<'_>, empty: bool) -> Result<(), String> {
        let name = element.name();
        let name = name.as_ref();
        if self.root.is_none() {
            self.root = match name {
                b"hierarchy" => Some(RootKind::Hierarchy),
                b"displays" => Some(RootKind::Displays),
                other => {
                    return Err(format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(other)
                    ))
                }
            };
            return Ok(());
        }
        match name {
            b"node" => {
                let node = node_from_attrs(&attr_map(element)?);
                if empty {
                    self.close_node(node);
                } else {
                    self.open_nodes.push(node);
                }
            }
            b"display" => {
                let attrs = attr_map(element)?;
                let display = DisplayDump {
                    id: text_attr(&attrs, "id"),
                    windows: Vec::new(),
                };
                if empty {
                    self.displays.push(display);
                } else {
                    self.display = Some(display);
                }
            }
            b"window" => {
                let attrs = attr_map(element)?;
                let window = WindowDump {
                    title: text_attr(&attrs, "title"),
                    window_type: text_attr(&attrs, "type"),
                    bounds: find_attr(&attrs, "bounds").and_then(parse_bounds),
                    roots: Vec::new(),
                };
                if empty {
                    if let Some(display) = self.display.as_mut() {
                        display.windows.push(window);
                    }
                } else {
                    self.window = Some(window);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), String> {
        match name {
            b"node" => {
                let node = self
                    .open_nodes
                    .pop()
                    .ok_or_else(|| "unbalanced </node>".to_string())?;
                self.close_node(node);
            }
            b"hierarchy" => self.flush_roots(),
            b"window" => {
                self.flush_roots();
                if let Some(window) = self.window.take() {
                    if let Some(display) = self.display.as_mut() {
                        display.windows.push(window);
                    }
                }
            }
            b"display" => {
                if let Some(display) = self.display.take() {
                    self.displays.push(display);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Result<DumpDocument, String> {
        if !self.open_nodes.is_empty() {
            return Err("dump ended inside an open <node>".to_string());
        }
        self.flush_roots();
        match self.root {
            Some(RootKind::Hierarchy) => Ok(DumpDocument::Flat(self.flat)),
            Some(RootKind::Displays) => Ok(DumpDocument::Displays(self.displays)),
            None => Err("dump has no root element".to_string()),
        }
    }
}

pub fn parse_dump(xml: &str) -> Result<DumpDocument, String> {
    let payload = extract_xml_payload(xml).ok_or_else(|| "dump contains no XML".to_string())?;
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut builder = DumpBuilder::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref element)) => builder.open(element, false)?,
            Ok(Event::Empty(ref element)) => builder.open(element, true)?,
            Ok(Event::End(ref element)) => builder.close(element.name().as_ref())?,
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(format!(
                    "XML parse error at byte {}: {err}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    builder.finish()
}
