use seller_bulk::config::Config;
use std::time::Duration;

#[test]
fn parse_example_config() {
    let raw = include_str!("../seller-bulk.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(!cfg.api.base_url.is_empty());
    assert!(!cfg.output.out_dir.is_empty());
    assert_eq!(cfg.progress.duplicate_interval_ms, 1000);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[api]\nbase_url = \"http://dash:3000\"\nuser_agent = \"t\"\n")
        .expect("parse TOML");
    assert_eq!(cfg.api.base_url, "http://dash:3000");
    assert_eq!(cfg.documents.document_type, "THERMAL_AIR_WAYBILL");

    let opts = cfg.executor_options();
    assert_eq!(opts.reset_after, Duration::from_millis(1500));
    assert!(opts.call_interval.is_zero());
    assert_eq!(cfg.duplicate_options().call_interval, Duration::from_secs(1));
}
