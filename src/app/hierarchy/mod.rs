pub mod accessibility;
pub mod cache;
pub mod engine;
pub mod geometry;
pub mod merge;
pub mod uiautomator;
pub mod ui_xml;
