use drive_photo_frame::config::Configuration;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn empty_document_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.auth_dir, PathBuf::from("../auth"));
    assert_eq!(cfg.display_duration, Duration::from_secs(30));
    assert_eq!(cfg.error_pause, Duration::from_secs(1));
    assert_eq!(cfg.retry_delay, Duration::from_secs(5));
    assert_eq!(cfg.max_connection_attempts, 10);
    assert_eq!(cfg.rotate_degrees, 270);
    assert_eq!(cfg.page_size, None);
    assert!(cfg.fullscreen);
    cfg.validated().unwrap();
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
auth-dir: "/etc/frame"
token-file: "oauth.json"
display-duration: 45s
error-pause: 500ms
retry-delay: 2s
max-connection-attempts: 3
page-size: 50
rotate-degrees: 90
shuffle-seed: 7
fullscreen: false
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.token_path(), PathBuf::from("/etc/frame/oauth.json"));
    assert_eq!(
        cfg.credentials_path(),
        PathBuf::from("/etc/frame/credentials.json")
    );
    assert_eq!(cfg.display_duration, Duration::from_secs(45));
    assert_eq!(cfg.error_pause, Duration::from_millis(500));
    assert_eq!(cfg.retry_delay, Duration::from_secs(2));
    assert_eq!(cfg.max_connection_attempts, 3);
    assert_eq!(cfg.page_size, Some(50));
    assert_eq!(cfg.rotate_degrees, 90);
    assert_eq!(cfg.shuffle_seed, Some(7));
    assert!(!cfg.fullscreen);
    cfg.validated().unwrap();
}

#[test]
fn reject_unsupported_rotation() {
    let cfg: Configuration = serde_yaml::from_str("rotate-degrees: 45").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("rotate-degrees"));
}

#[test]
fn reject_zero_attempts_and_page_size() {
    let cfg: Configuration = serde_yaml::from_str("max-connection-attempts: 0").unwrap();
    assert!(cfg.validated().is_err());

    let cfg: Configuration = serde_yaml::from_str("page-size: 0").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn reject_zero_display_duration() {
    let cfg: Configuration = serde_yaml::from_str("display-duration: 0s").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn reject_zero_error_pause() {
    let cfg: Configuration = serde_yaml::from_str("error-pause: 0s").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("error-pause"));
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "folder-id-file: folder.txt\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.folder_id_path(), PathBuf::from("../auth/folder.txt"));
}
