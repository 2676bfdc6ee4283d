//! Detection tests

use std::fs;
use std::path::Path;

use ggprov::detect::checker::{ProvisioningDetector, RequiredComponent, RuntimeVersion};
use tempfile::TempDir;

const VALID_YAML: &str = "---\nsystem:\n  thingName: \"Device-7\"\nservices:\n  aws.greengrass.Nucleus:\n    version: \"2.9.0\"\n";

fn install_credentials(root: &Path) {
    fs::create_dir_all(root.join("certs")).unwrap();
    fs::write(root.join("certs").join("device.crt"), "cert").unwrap();
    fs::write(root.join("certs").join("device.key"), "key").unwrap();
    fs::create_dir_all(root.join("ggc-root")).unwrap();
}

fn write_config(root: &Path, name: &str, content: &str) {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(root.join("config").join(name), content).unwrap();
}

#[tokio::test]
async fn test_missing_root() {
    let tmp = TempDir::new().unwrap();
    let status = ProvisioningDetector::new(tmp.path().join("absent"))
        .detect()
        .await;
    assert!(!status.is_provisioned);
    assert_eq!(status.details, "root directory does not exist");
    assert!(status.missing_components.is_empty());
    assert_eq!(status.detected_version, RuntimeVersion::Unknown);
}

#[tokio::test]
async fn test_config_only_reports_missing_certificates() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "config.yaml", VALID_YAML);

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(!status.is_provisioned);
    assert_eq!(
        status.missing_components,
        vec![RequiredComponent::Certificates, RequiredComponent::WorkingRoot]
    );
    assert_eq!(status.details, "missing components: certificates, ggc-root");
}

#[tokio::test]
async fn test_certificates_need_both_cert_and_key() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "config.yaml", VALID_YAML);
    fs::create_dir_all(tmp.path().join("ggc-root")).unwrap();
    fs::create_dir_all(tmp.path().join("certs")).unwrap();
    fs::write(tmp.path().join("certs").join("Thing.cert.pem"), "cert").unwrap();

    let detector = ProvisioningDetector::new(tmp.path());
    let status = detector.detect().await;
    assert!(status.is_missing(RequiredComponent::Certificates));

    fs::write(tmp.path().join("certs").join("Thing.private.key"), "key").unwrap();
    assert!(detector.detect().await.is_provisioned);
}

#[tokio::test]
async fn test_valid_yaml_is_provisioned_v2() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    write_config(tmp.path(), "config.yaml", VALID_YAML);

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(status.is_provisioned);
    assert_eq!(status.details, "fully provisioned");
    assert_eq!(status.identity_name, "Device-7");
    assert_eq!(status.detected_version, RuntimeVersion::V2);
    assert_eq!(
        status.config_file.as_deref(),
        Some(tmp.path().join("config").join("config.yaml").as_path())
    );
}

#[tokio::test]
async fn test_marker_substrings_are_enough() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    // not valid YAML, but both markers appear
    write_config(tmp.path(), "config.yml", "{{{ services: ][ system: !!");

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(status.is_provisioned);
    assert_eq!(status.identity_name, "unknown");
}

#[tokio::test]
async fn test_invalid_content_is_corrupt_not_missing() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    write_config(tmp.path(), "config.yaml", "system:\n  thingName: Only\n");

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(!status.is_provisioned);
    assert_eq!(status.details, "configuration file is invalid or corrupted");
    assert!(status.missing_components.is_empty());
}

#[tokio::test]
async fn test_legacy_json_is_v1() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    write_config(
        tmp.path(),
        "config.json",
        r#"{"coreThing": {"thingName": "LegacyThing"}}"#,
    );

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(status.is_provisioned);
    assert_eq!(status.detected_version, RuntimeVersion::V1);
    assert_eq!(status.identity_name, "LegacyThing");
}

#[tokio::test]
async fn test_json_without_known_section_is_invalid() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    write_config(tmp.path(), "config.json", r#"{"other": {}}"#);

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(!status.is_provisioned);
    assert_eq!(status.details, "configuration file is invalid or corrupted");
}

#[tokio::test]
async fn test_empty_yaml_falls_through_to_json() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    write_config(tmp.path(), "config.yaml", "");
    write_config(
        tmp.path(),
        "config.json",
        r#"{"system": {"thingName": "JsonThing"}}"#,
    );

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert!(status.is_provisioned);
    assert_eq!(status.identity_name, "JsonThing");
    assert_eq!(
        status.config_file.as_deref(),
        Some(tmp.path().join("config").join("config.json").as_path())
    );
}

#[tokio::test]
async fn test_recipes_dir_means_v2() {
    let tmp = TempDir::new().unwrap();
    install_credentials(tmp.path());
    write_config(
        tmp.path(),
        "config.json",
        r#"{"system": {"thingName": "T"}}"#,
    );
    fs::create_dir_all(tmp.path().join("recipes")).unwrap();

    let status = ProvisioningDetector::new(tmp.path()).detect().await;
    assert_eq!(status.detected_version, RuntimeVersion::V2);
}
