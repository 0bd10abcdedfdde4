use crate::app::adb::gateway::{AdbGateway, DeviceGateway};
use crate::app::config::InspectorConfig;
use crate::app::error::AppError;
use crate::app::hierarchy::accessibility::{AccessibilityBridge, AccessibilityClient};
use crate::app::session::SessionManager;

pub struct AppState {
    pub config: InspectorConfig,
    pub gateway: Box<dyn DeviceGateway>,
    pub accessibility: Box<dyn AccessibilityBridge>,
    pub session: SessionManager,
}

impl AppState {
    pub fn new(config: InspectorConfig, trace_id: &str) -> Result<Self, AppError> {
        let gateway = AdbGateway::from_settings(&config.adb, &config.timeouts, trace_id)?;
        let accessibility =
            AccessibilityClient::new(config.accessibility.clone(), config.timeouts.probe());
        Ok(Self::with_parts(
            config,
            Box::new(gateway),
            Box::new(accessibility),
        ))
    }

    pub fn with_parts(
        config: InspectorConfig,
        gateway: Box<dyn DeviceGateway>,
        accessibility: Box<dyn AccessibilityBridge>,
    ) -> Self {
        Self {
            config,
            gateway,
            accessibility,
            session: SessionManager::new(),
        }
    }
}
