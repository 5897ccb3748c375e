use can_core::{ChannelConfig, DEFAULT_BITRATE};

#[test]
fn test_channel_config() -> anyhow::Result<()> {
    let config = ChannelConfig::default();
    assert_eq!(config.bitrate(), DEFAULT_BITRATE);
    assert!(!config.enabled());
    assert!(!config.monitor());
    assert!(!config.loopback());

    let mut config = ChannelConfig::new(250_000);
    config.set_enabled(true)
        .set_loopback(true)
        .set_bitrate(125_000);
    assert_eq!(config.bitrate(), 125_000);
    assert!(config.enabled() && config.loopback() && !config.monitor());

    Ok(())
}

#[test]
fn test_channel_config_yaml() -> anyhow::Result<()> {
    let configs: Vec<ChannelConfig> = serde_yaml::from_str(r#"
- bitrate: 500000
  enabled: true
- bitrate: 1000000
  monitor: true
  loopback: true
"#)?;
    assert_eq!(configs.len(), 2);
    assert!(configs[0].enabled());
    assert!(!configs[0].monitor());
    assert_eq!(configs[1].bitrate(), 1_000_000);
    assert!(!configs[1].enabled());
    assert!(configs[1].monitor() && configs[1].loopback());

    let yaml = serde_yaml::to_string(&configs[1])?;
    assert_eq!(serde_yaml::from_str::<ChannelConfig>(&yaml)?, configs[1]);

    assert!(serde_yaml::from_str::<ChannelConfig>("enabled: true").is_err());

    Ok(())
}
