//! Scripted in-memory gateway for exercising the engines without hardware.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::app::adb::gateway::DeviceGateway;
use crate::app::error::AppError;
use crate::app::hierarchy::accessibility::{
    AccessibilityBounds, AccessibilityBridge, AccessibilityNode, AccessibilityWindow,
};
use crate::app::models::DeviceSummary;

type Reply = Result<Vec<u8>, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Server,
    Process,
}

#[derive(Default)]
pub struct ScriptedGateway {
    // Keyed by exact command; the last queued reply repeats once the queue is drained.
    replies: Mutex<HashMap<(Transport, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<(Transport, String)>>,
    forwards: Mutex<Vec<(u16, u16)>>,
    devices: Vec<DeviceSummary>,
    connect_error: Option<String>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(mut self, devices: Vec<DeviceSummary>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_connect_error(mut self, message: &str) -> Self {
        self.connect_error = Some(message.to_string());
        self
    }

    pub fn on(self, transport: Transport, command: &str, reply: Reply) -> Self {
        self.on_sequence(transport, command, vec![reply])
    }

    pub fn on_shell(self, command: &str, output: impl AsRef<[u8]>) -> Self {
        self.on(Transport::Server, command, Ok(output.as_ref().to_vec()))
    }

    pub fn on_shell_error(self, command: &str, message: &str) -> Self {
        self.on(Transport::Server, command, Err(message.to_string()))
    }

    pub fn on_process(self, command: &str, output: impl AsRef<[u8]>) -> Self {
        self.on(Transport::Process, command, Ok(output.as_ref().to_vec()))
    }

    pub fn on_sequence(self, transport: Transport, command: &str, replies: Vec<Reply>) -> Self {
        if let Ok(mut guard) = self.replies.lock() {
            guard
                .entry((transport, command.to_string()))
                .or_default()
                .extend(replies);
        }
        self
    }

    pub fn calls(&self) -> Vec<(Transport, String)> {
        self.calls.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn commands(&self, transport: Transport) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(t, _)| *t == transport)
            .map(|(_, command)| command)
            .collect()
    }

    pub fn forwards(&self) -> Vec<(u16, u16)> {
        self.forwards.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    fn reply(&self, transport: Transport, command: &str, trace_id: &str) -> Result<Vec<u8>, AppError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((transport, command.to_string()));
        }
        let mut guard = self
            .replies
            .lock()
            .map_err(|_| AppError::system("script lock poisoned", trace_id))?;
        let Some(queue) = guard.get_mut(&(transport, command.to_string())) else {
            return Err(AppError::dependency(
                format!("no scripted reply for `{command}`"),
                trace_id,
            ));
        };
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match reply {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(message)) => Err(AppError::dependency(message, trace_id)),
            None => Err(AppError::dependency("empty script", trace_id)),
        }
    }
}

impl DeviceGateway for ScriptedGateway {
    fn shell(
        &self,
        _serial: &str,
        command: &str,
        _timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<u8>, AppError> {
        self.reply(Transport::Server, command, trace_id)
    }

    fn shell_process(
        &self,
        _serial: &str,
        command: &str,
        _timeout: Duration,
        trace_id: &str,
    ) -> Result<Vec<u8>, AppError> {
        self.reply(Transport::Process, command, trace_id)
    }

    fn forward(
        &self,
        _serial: &str,
        local_port: u16,
        remote_port: u16,
        _trace_id: &str,
    ) -> Result<(), AppError> {
        if let Ok(mut guard) = self.forwards.lock() {
            guard.push((local_port, remote_port));
        }
        Ok(())
    }

    fn connect(&self, address: &str, trace_id: &str) -> Result<(), AppError> {
        match &self.connect_error {
            Some(message) => Err(AppError::dependency(
                format!("adb connect {address} failed: {message}"),
                trace_id,
            )),
            None => Ok(()),
        }
    }

    fn list_devices(&self, _trace_id: &str) -> Result<Vec<DeviceSummary>, AppError> {
        Ok(self.devices.clone())
    }
}

pub fn online_device(serial: &str) -> DeviceSummary {
    DeviceSummary {
        serial: serial.to_string(),
        state: "device".to_string(),
        model: None,
        product: None,
        device: None,
        transport_id: None,
    }
}

/// A PNG-looking payload comfortably above the capture size threshold.
pub fn fake_png(len: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(len.max(8), 0xAB);
    bytes
}

/// Accessibility bridge that replays a fixed outcome.
pub struct StaticBridge {
    pub running: bool,
    pub nodes: Result<Vec<AccessibilityNode>, String>,
}

impl StaticBridge {
    pub fn failing(message: &str) -> Self {
        Self {
            running: false,
            nodes: Err(message.to_string()),
        }
    }

    pub fn serving(nodes: Vec<AccessibilityNode>) -> Self {
        Self {
            running: true,
            nodes: Ok(nodes),
        }
    }
}

impl AccessibilityBridge for StaticBridge {
    fn is_running(&self, _gateway: &dyn DeviceGateway, _serial: &str, _trace_id: &str) -> bool {
        self.running
    }

    fn fetch_nodes(
        &self,
        _gateway: &dyn DeviceGateway,
        _serial: &str,
        _display_id: &str,
        _trace_id: &str,
    ) -> Result<Vec<AccessibilityNode>, String> {
        self.nodes.clone()
    }
}

pub fn window_node(window: AccessibilityBounds, bounds: AccessibilityBounds) -> AccessibilityNode {
    AccessibilityNode {
        class_name: "android.widget.FrameLayout".to_string(),
        bounds,
        window: Some(AccessibilityWindow {
            title: Some("Launcher".to_string()),
            window_type: 1,
            display_id: 2,
            bounds: window,
        }),
        ..AccessibilityNode::default()
    }
}
