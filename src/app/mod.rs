pub mod adb;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod fallback;
pub mod hierarchy;
pub mod interaction;
pub mod logging;
pub mod models;
pub mod session;
pub mod state;
pub mod ui_capture;

#[cfg(test)]
pub mod testing;
