//! SQLite record store tests

use ggprov::errors::ProvisionError;
use ggprov::records::sqlite::SqliteRecordStore;
use ggprov::records::store::RecordStore;
use rusqlite::{params, Connection};
use tempfile::TempDir;

fn create_database(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE device_config (
            device_id TEXT PRIMARY KEY, thing_name TEXT, iot_endpoint TEXT, aws_region TEXT,
            root_ca_path TEXT, certificate_pem TEXT, private_key_pem TEXT, role_alias TEXT,
            role_alias_endpoint TEXT, nucleus_version TEXT, deployment_group TEXT,
            initial_components TEXT, proxy_url TEXT, mqtt_port INTEGER, custom_domain TEXT
        );
        CREATE TABLE device_identifiers (mac_address TEXT, serial_number TEXT, device_id TEXT);",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO device_config VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            "d1",
            "Thing1",
            "iot.example.com",
            "us-east-1",
            "CA",
            "CERT",
            "KEY",
            "Role1",
            "cred.example.com",
            "2.12.0",
            "fleet",
            "aws.greengrass.Cli,aws.greengrass.LocalDebugConsole",
            "http://proxy:3128",
            8883,
            "example.org"
        ],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO device_identifiers VALUES (?1, ?2, ?3)",
        params!["00:11:22:33:44:55", "SERIAL-9", "d1"],
    )
    .unwrap();
}

#[test]
fn test_mac_lookup_matches_primary_lookup() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("devices.db");
    create_database(&path);

    let mut store = SqliteRecordStore::new(&path);
    assert!(store.connect(), "{}", store.last_error());

    let by_id = store.get_by_primary_id("d1").unwrap().unwrap();
    let by_mac = store
        .get_by_secondary_identifier("001122334455")
        .unwrap()
        .unwrap();
    let by_serial = store
        .get_by_secondary_identifier("SERIAL-9")
        .unwrap()
        .unwrap();
    assert_eq!(by_mac, by_id);
    assert_eq!(by_serial, by_id);
    assert_eq!(
        serde_json::to_vec(&by_mac).unwrap(),
        serde_json::to_vec(&by_id).unwrap()
    );

    assert_eq!(by_id.runtime_version(), "2.12.0");
    assert_eq!(by_id.proxy_url(), Some("http://proxy:3128"));
    assert_eq!(by_id.custom_domain.as_deref(), Some("example.org"));
    assert_eq!(by_id.initial_components.len(), 2);
}

#[test]
fn test_store_is_read_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("devices.db");
    create_database(&path);
    let before = std::fs::read(&path).unwrap();

    let mut store = SqliteRecordStore::new(&path);
    assert!(store.connect());
    let _ = store.list_device_ids().unwrap();
    store.disconnect();

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_disconnected_lookup_is_distinguishable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("devices.db");
    create_database(&path);

    let mut store = SqliteRecordStore::new(&path);
    let err = store.get_by_secondary_identifier("SERIAL-9").unwrap_err();
    assert!(matches!(err, ProvisionError::NotConnected));
    assert_eq!(err.to_string(), "Database not connected");
}
