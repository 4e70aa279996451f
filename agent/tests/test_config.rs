//! Config tree resolver integration tests

use esprov::config::device::{DeviceConfig, DEVICE_CONFIG_FILE};
use esprov::filesys::dir::Dir;
use serde_json::{json, Map, Value};

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("fixture must be a JSON object"),
    }
}

fn local_tree() -> Map<String, Value> {
    as_map(json!({
        "network": {
            "ssid": "default-net",
            "passphrase": "default-pass",
            "ap_fallback": true
        },
        "device": {
            "id": "ESPixelStick",
            "blanktime": 5
        }
    }))
}

fn device_tree() -> Map<String, Value> {
    as_map(json!({
        "network": {
            "ssid": "front-yard",
            "passphrase": "hunter2"
        }
    }))
}

#[test]
fn test_get_prefers_device_tree() {
    let config = DeviceConfig::with_trees(Some(local_tree()), Some(device_tree()));
    assert_eq!(config.ssid(), "front-yard");
}

#[test]
fn test_get_falls_back_to_local() {
    let config = DeviceConfig::with_trees(Some(local_tree()), Some(device_tree()));
    // not in the device tree at all
    assert_eq!(config.id(), "ESPixelStick");

    let local_only = DeviceConfig::with_trees(Some(local_tree()), None);
    assert_eq!(local_only.ssid(), "default-net");
}

#[test]
fn test_get_missing_key_is_not_fatal() {
    let config = DeviceConfig::with_trees(Some(local_tree()), None);
    assert_eq!(config.get("gateway"), None);
    assert_eq!(config.get_str("gateway"), "");
}

#[test]
fn test_get_flag_defaults_to_false() {
    let config = DeviceConfig::with_trees(Some(local_tree()), None);
    assert!(config.get_flag("ap_fallback"));
    assert!(!config.get_flag("no_such_flag"));
    // non-boolean values read as false through the flag accessor
    assert!(!config.get_flag("ssid"));
}

#[test]
fn test_set_then_get_returns_new_value() {
    let mut config = DeviceConfig::with_trees(Some(local_tree()), Some(device_tree()));
    config.set_ssid("back-yard");
    assert_eq!(config.ssid(), "back-yard");
}

#[test]
fn test_set_never_introduces_a_key() {
    // hostname exists in neither fixture: setting it must not create it
    let mut config = DeviceConfig::with_trees(Some(local_tree()), Some(device_tree()));
    config.set_hostname("new-host");
    assert_eq!(config.hostname(), "");
}

#[tokio::test]
async fn test_set_applies_to_every_tree_that_has_the_key() {
    let dir = Dir::create_temp_dir("esprov-config").await.unwrap();

    // both trees carry ssid; save() writes the device tree, so a save
    // after set observes the device-side update
    let mut config = DeviceConfig::with_trees(Some(local_tree()), Some(device_tree()));
    config.set_ssid("updated");
    let device_out = dir.file("device.json");
    config.save(&device_out).await.unwrap();
    let saved: Value = device_out.read_json().await.unwrap();
    assert_eq!(saved["network"]["ssid"], json!("updated"));

    // with no device tree, save() falls back to the local tree, which
    // must carry the same update
    let mut local_only = DeviceConfig::with_trees(Some(local_tree()), None);
    local_only.set_ssid("updated");
    let local_out = dir.file("local.json");
    local_only.save(&local_out).await.unwrap();
    let saved: Value = local_out.read_json().await.unwrap();
    assert_eq!(saved["network"]["ssid"], json!("updated"));

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_set_absent_key_changes_nothing_on_disk() {
    let dir = Dir::create_temp_dir("esprov-config").await.unwrap();

    let mut config = DeviceConfig::with_trees(Some(local_tree()), None);
    let before = dir.file("before.json");
    config.save(&before).await.unwrap();

    config.set("gateway", "10.0.0.1");
    let after = dir.file("after.json");
    config.save(&after).await.unwrap();

    assert_eq!(
        before.read_string().await.unwrap(),
        after.read_string().await.unwrap()
    );

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_load_local_and_device_round_trip() {
    let dir = Dir::create_temp_dir("esprov-config").await.unwrap();

    let local_file = dir.file("config.json");
    local_file
        .write_json(&json!({ "network": { "ssid": "bundled" } }))
        .await
        .unwrap();

    let mut config = DeviceConfig::load_local(&local_file).await.unwrap();
    assert!(!config.has_device());
    assert_eq!(config.ssid(), "bundled");

    let unpack = dir.subdir("unpacked");
    unpack.create().await.unwrap();
    unpack
        .file(DEVICE_CONFIG_FILE)
        .write_json(&json!({ "network": { "ssid": "on-device" } }))
        .await
        .unwrap();

    config.load_device(unpack.path()).await.unwrap();
    assert!(config.has_device());
    assert_eq!(config.ssid(), "on-device");

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_save_writes_values_unescaped() {
    let dir = Dir::create_temp_dir("esprov-config").await.unwrap();

    let config = DeviceConfig::with_trees(
        Some(as_map(json!({ "device": { "id": "Porch & Garage" } }))),
        None,
    );
    let out = dir.file("config.json");
    config.save(&out).await.unwrap();

    let contents = out.read_string().await.unwrap();
    assert!(contents.contains("Porch & Garage"));

    dir.delete().await.unwrap();
}
