use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub(crate) struct AppConfig {
    // REQUIRED
    pub influx: InfluxConfig,

    // REQUIRED
    pub ups: UpsConfig,

    #[serde(default)]
    pub heartbeat: Option<HeartbeatConfig>,

    #[serde(default)]
    pub sentry: SentryConfig,
}
impl AppConfig {
    pub fn load(config_filepath: Option<PathBuf>) -> Result<Self> {
        let config_path = config_filepath.unwrap_or_else(|| PathBuf::from("config.toml"));

        let config_content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

        let config: AppConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse TOML config file: {config_path:?}"))?;

        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfluxConfig {
    pub url: String,    // REQUIRED, including protocol and port
    pub bucket: String, // REQUIRED, 'database/retention-policy' or a bare database name

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_influx_measurement")]
    pub measurement: String,

    #[serde(default = "default_influx_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpsConfig {
    pub ups: String,      // REQUIRED, format 'upsname[@hostname[:port]]'
    pub name_tag: String, // REQUIRED, value for the ups_name tag

    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default)]
    pub print_usage: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeartbeatConfig {
    pub url: String, // REQUIRED when the section is present

    #[serde(default = "default_heartbeat_interval")]
    pub interval: u64,

    #[serde(default = "default_liveness_threshold")]
    pub liveness_threshold: u64,
}

#[derive(Default, Debug, Deserialize)]
pub(crate) struct SentryConfig {
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

fn default_influx_measurement() -> String {
    "ups_stats".to_string()
}
fn default_influx_timeout() -> u64 {
    3
}
fn default_poll_interval() -> u64 {
    30
}
fn default_heartbeat_interval() -> u64 {
    60
}
fn default_liveness_threshold() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [influx]
            url = "http://192.168.1.1:8086"
            bucket = "ups"

            [ups]
            ups = "myups@localhost"
            name_tag = "office"
            "#,
        )
        .unwrap();

        assert_eq!(config.influx.measurement, "ups_stats");
        assert_eq!(config.influx.timeout, 3);
        assert_eq!(config.influx.username, "");
        assert_eq!(config.ups.poll_interval, 30);
        assert!(!config.ups.print_usage);
        assert!(config.heartbeat.is_none());
        assert!(config.sentry.sentry_dsn.is_none());
    }

    #[test]
    fn parses_heartbeat_section_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [influx]
            url = "http://192.168.1.1:8086"
            bucket = "ups/autogen"

            [ups]
            ups = "myups"
            name_tag = "office"

            [heartbeat]
            url = "https://example.com/hb"
            "#,
        )
        .unwrap();

        let heartbeat = config.heartbeat.expect("heartbeat section should parse");
        assert_eq!(heartbeat.url, "https://example.com/hb");
        assert_eq!(heartbeat.interval, 60);
        assert_eq!(heartbeat.liveness_threshold, 120);
    }

    #[test]
    fn rejects_config_missing_required_sections() {
        let result = toml::from_str::<AppConfig>(
            r#"
            [influx]
            url = "http://192.168.1.1:8086"
            bucket = "ups"
            "#,
        );
        assert!(result.is_err());
    }
}
