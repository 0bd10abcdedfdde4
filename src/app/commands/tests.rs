use super::*;

use crate::app::display::topology::{DISPLAY_MANAGER_DUMP, SURFACE_FLINGER_DUMP};
use crate::app::models::HierarchySource;
use crate::app::config::{backup_config_path, load_config, CONFIG_PATH_ENV};
use crate::app::testing::{fake_png, online_device, ScriptedGateway, StaticBridge, Transport};

fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    LOCK.get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .expect("env lock")
}

const SF_DUMP: &str = "\
Display 4630947208271169553 (HWC display 0): port=1 pnpId=GGL displayName=\"DP_0\"
Display 4630946780669082146 (HWC display 1): port=2 pnpId=GGL displayName=\"DP_2\"
";

const DISPLAY_DUMP: &str = "\
Display Devices: size=2
  Display Device 0:
    DisplayDeviceInfo{\"DP_0\": uniqueId=\"local:4630947208271169553\", 2880 x 1440, modeId 1}
    mDisplayId=0
    mUniqueId=local:4630947208271169553
  Display Device 1:
    DisplayDeviceInfo{\"DP_2\": uniqueId=\"local:4630946780669082146\", 1920 x 720, modeId 2}
    mDisplayId=2
    mUniqueId=local:4630946780669082146
";

fn test_config() -> InspectorConfig {
    let mut config = InspectorConfig::default();
    config.hierarchy.retry_delay_ms = 0;
    config
}

fn state_with(gateway: ScriptedGateway) -> AppState {
    AppState::with_parts(
        test_config(),
        Box::new(gateway),
        Box::new(StaticBridge::failing("service down")),
    )
}

fn ss4_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .with_devices(vec![online_device("HU123")])
        .on_shell("getprop ro.product.model", "HU_SS4\n")
        .on_shell("getprop ro.build.version.sdk", "33\n")
        .on_shell("getprop ro.build.display.id", "ss4.user.2024.10\n")
        .on_shell(SURFACE_FLINGER_DUMP, SF_DUMP)
        .on_shell(DISPLAY_MANAGER_DUMP, DISPLAY_DUMP)
}

fn connected(gateway: ScriptedGateway) -> AppState {
    let state = state_with(gateway);
    connect_device(None, &state, Some("trace-connect".to_string())).expect("connect");
    state
}

#[test]
fn resolve_trace_id_generates_when_missing() {
    assert_eq!(resolve_trace_id(Some("abc".to_string())), "abc");
    let generated = resolve_trace_id(Some("  ".to_string()));
    assert!(Uuid::parse_str(&generated).is_ok());
}

#[test]
fn operations_require_a_current_device() {
    let state = state_with(ScriptedGateway::new());
    let err = capture_screenshot("0".to_string(), &state, Some("trace-1".to_string()))
        .expect_err("no device");
    assert_eq!(err.code, "ERR_NO_DEVICE");
    assert_eq!(err.trace_id, "trace-1");

    let err = acquire_hierarchy("0".to_string(), None, &state, None).expect_err("no device");
    assert_eq!(err.code, "ERR_NO_DEVICE");
}

#[test]
fn rejects_non_numeric_display_ids() {
    let state = connected(ss4_gateway());
    let err = tap("0; reboot".to_string(), 1, 1, &state, None).expect_err("invalid");
    assert_eq!(err.code, "ERR_VALIDATION");
    let err = back(" ".to_string(), &state, None).expect_err("invalid");
    assert_eq!(err.code, "ERR_VALIDATION");
}

#[test]
fn connect_picks_first_online_device_and_resolves_topology() {
    let gateway = ss4_gateway().with_devices(vec![
        DeviceSummary {
            state: "offline".to_string(),
            ..online_device("OFF1")
        },
        online_device("HU123"),
    ]);
    let state = state_with(gateway);
    let response = connect_device(None, &state, None).expect("connect");
    assert_eq!(response.data.serial, "HU123");
    assert_eq!(response.data.model.as_deref(), Some("HU_SS4"));
    assert_eq!(response.data.sdk.as_deref(), Some("33"));
    assert_eq!(response.data.variant, Some(VariantTag::Ss4));

    let topology = state.session.topology().expect("topology");
    assert_eq!(topology.physical_id("2"), Some("4630946780669082146"));
}

#[test]
fn connect_surfaces_network_connect_failure() {
    let state = state_with(ScriptedGateway::new().with_connect_error("unable to connect"));
    let err = connect_device(Some("10.0.0.5:5555".to_string()), &state, None)
        .expect_err("connect fails");
    assert_eq!(err.code, "ERR_DEPENDENCY");
    assert!(state.session.current().is_none());
}

#[test]
fn connect_rejects_unknown_usb_serial() {
    let state = state_with(ScriptedGateway::new().with_devices(vec![online_device("A")]));
    let err = connect_device(Some("B".to_string()), &state, None).expect_err("offline");
    assert_eq!(err.code, "ERR_DEPENDENCY");
}

#[test]
fn disconnect_clears_session() {
    let state = connected(ss4_gateway());
    assert!(disconnect_device(&state, None).data);
    assert!(state.session.current().is_none());
    assert!(state.session.topology().is_none());
    assert!(!disconnect_device(&state, None).data);
}

#[test]
fn get_displays_falls_back_to_static_seats() {
    let gateway = ScriptedGateway::new()
        .with_devices(vec![online_device("HU123")])
        .on_shell(SURFACE_FLINGER_DUMP, SF_DUMP)
        .on_shell(DISPLAY_MANAGER_DUMP, "Display Devices: size=0\n");
    let state = connected(gateway);
    let displays = get_displays(&state, None).expect("displays").data;
    let ids: Vec<&str> = displays.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["0", "2", "4", "5"]);
    assert_eq!(displays[3].description, "Display 5 (Rear R)");

    let err = resolve_topology(&state, None).expect_err("unavailable");
    assert_eq!(err.code, "ERR_TOPOLOGY_UNAVAILABLE");
}

#[test]
fn get_displays_returns_resolved_labels() {
    let state = connected(ss4_gateway());
    let displays = get_displays(&state, None).expect("displays").data;
    assert_eq!(displays.len(), 2);
    assert_eq!(displays[0].description, "Main Driver (DP_0) (2880x1440)");
    assert_eq!(displays[1].description, "Passenger (DP_2) (1920x720)");
}

#[test]
fn classify_variant_updates_current_device() {
    let gateway = ScriptedGateway::new()
        .with_devices(vec![online_device("HU123")])
        .on_sequence(
            Transport::Server,
            "getprop ro.build.display.id",
            vec![Ok(b"unknown\n".to_vec()), Ok(b"SS2_R1\n".to_vec())],
        );
    let state = connected(gateway);
    assert_eq!(state.session.current().and_then(|d| d.variant), None);

    let variant = classify_variant(&state, None).expect("variant").data;
    assert_eq!(variant, Some(VariantTag::Ss2));
    assert_eq!(
        state.session.current().and_then(|d| d.variant),
        Some(VariantTag::Ss2)
    );
}

#[test]
fn ss4_capture_uses_logical_id_before_bare_command() {
    let gateway = ss4_gateway().on_shell("screencap -d 0 -p", fake_png(4096));
    let state = connected(gateway);
    let png = capture_screenshot("0".to_string(), &state, None)
        .expect("capture")
        .data;
    assert!(png.starts_with(b"\x89PNG"));
}

#[test]
fn capture_reports_last_error_when_exhausted() {
    let state = connected(ss4_gateway());
    let err = capture_screenshot("2".to_string(), &state, None).expect_err("exhausted");
    assert_eq!(err.code, "ERR_CAPTURE_FAILED");
    assert!(err.error.contains("display 2"));
}

#[test]
fn hierarchy_degrades_to_empty_without_cache() {
    let state = connected(ss4_gateway());
    let snapshot = acquire_hierarchy("2".to_string(), Some(true), &state, None)
        .expect("never fails")
        .data;
    assert_eq!(snapshot.source, HierarchySource::Empty);
    assert!(snapshot.tree.is_empty());
    let error = snapshot.error.unwrap_or_default();
    assert!(error.contains("service down"));
    assert!(error.contains("uiautomator"));
}

#[test]
fn tap_targets_display_with_flag() {
    let state = connected(ss4_gateway().on_shell("input -d 2 tap 100 200", ""));
    let result = tap("2".to_string(), 100, 200, &state, None)
        .expect("tap")
        .data;
    assert_eq!(result.command, "input -d 2 tap 100 200");
}

#[test]
fn swipe_validates_duration() {
    let state = connected(ss4_gateway());
    let err = swipe("0".to_string(), 0, 0, 10, 10, 0, &state, None).expect_err("duration");
    assert_eq!(err.code, "ERR_VALIDATION");
}

#[test]
fn enable_accessibility_appends_component() {
    let component = test_config().accessibility.service_component;
    let gateway = ss4_gateway()
        .on_shell(
            "settings get secure enabled_accessibility_services",
            "com.other/.Service\n",
        )
        .on_shell(
            &format!("settings put secure enabled_accessibility_services com.other/.Service:{component}"),
            "",
        )
        .on_shell("settings put secure accessibility_enabled 1", "");
    let state = connected(gateway);
    let status = enable_accessibility(&state, None).expect("enable").data;
    // The scripted read still returns the old list, and the static bridge is not running.
    assert!(!status.enabled);
    assert!(!status.running);
    assert!(status.error.is_none());
}

#[test]
fn accessibility_status_reports_read_failures() {
    let state = connected(ss4_gateway());
    let status = accessibility_status(&state, None).expect("status").data;
    assert!(!status.enabled);
    assert!(status.error.is_some());
}

#[test]
fn disable_accessibility_removes_component() {
    let component = test_config().accessibility.service_component;
    let gateway = ss4_gateway()
        .on_sequence(
            Transport::Server,
            "settings get secure enabled_accessibility_services",
            vec![
                Ok(format!("com.other/.Service:{component}\n").into_bytes()),
                Ok(b"com.other/.Service\n".to_vec()),
            ],
        )
        .on_shell(
            "settings put secure enabled_accessibility_services com.other/.Service",
            "",
        );
    let state = connected(gateway);
    let status = disable_accessibility(&state, None).expect("disable").data;
    assert!(!status.enabled);
    assert!(status.error.is_none());
}

#[test]
fn disable_accessibility_requires_device() {
    let state = state_with(ScriptedGateway::new());
    let err = disable_accessibility(&state, None).expect_err("no device");
    assert_eq!(err.code, "ERR_NO_DEVICE");
}

#[test]
fn save_app_config_validates_and_backs_up_previous_file() {
    let _guard = env_lock();
    let tmp = tempfile::TempDir::new().expect("tmp");
    let config_path = tmp.path().join("config.json");
    std::env::set_var(CONFIG_PATH_ENV, &config_path);

    let saved = save_app_config(InspectorConfig::default(), Some("trace-save".to_string()))
        .expect("first save");
    assert_eq!(saved.trace_id, "trace-save");
    assert!(!backup_config_path().exists());

    let mut config = InspectorConfig::default();
    config.hierarchy.dump_retries = 0;
    config.hierarchy.retry_delay_ms = 0;
    let saved = save_app_config(config, None).expect("second save").data;
    assert_eq!(saved.hierarchy.dump_retries, 3);
    assert_eq!(backup_config_path(), tmp.path().join("config.backup.json"));
    assert!(backup_config_path().exists());

    let loaded = load_config().expect("load");
    std::env::remove_var(CONFIG_PATH_ENV);
    assert_eq!(loaded, saved);
}
