use triton::config::Config;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.serial.port = "/dev/ttyUSB3".to_string();
    cfg.vebus.response_timeout_ms = 250;
    cfg.controls.max_power_w = 3000;

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.serial.port, "/dev/ttyUSB3");
    assert_eq!(loaded.vebus.response_timeout_ms, 250);
    assert_eq!(loaded.controls.max_power_w, 3000);
}

#[test]
fn defaults_match_the_bus() {
    let cfg = Config::default();
    assert_eq!(cfg.serial.baud, 256_000);
    assert_eq!(cfg.serial.data_bits, 8);
    assert_eq!(cfg.vebus.fifo_size, 32);
    assert_eq!(cfg.vebus.max_resend, 2);
    cfg.validate().unwrap();
}

#[test]
fn partial_yaml_fills_in_defaults() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("partial.yaml");
    std::fs::write(&path, "serial:\n  port: /dev/ttyAMA1\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.serial.port, "/dev/ttyAMA1");
    assert_eq!(cfg.serial.baud, 256_000);
    assert_eq!(cfg.vebus.fifo_size, 32);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    cfg.serial.port.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.serial.parity = "Mark".to_string();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.vebus.fifo_size = 0;
    assert!(cfg.validate().is_err());

    // Too small to hold even a sync frame
    cfg = Config::default();
    cfg.vebus.max_frame_size = 8;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.controls.min_power_w = 5000;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.controls.update_interval_ms = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), "serial: [not, a, mapping").unwrap();
    assert!(Config::from_file(tmp.path()).is_err());
}
