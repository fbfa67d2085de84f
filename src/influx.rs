use crate::config::InfluxConfig;
use anyhow::{bail, Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/*
   Minimal InfluxDB client speaking the v2 compatibility write API with
   line protocol, as served by both 1.8+ and 2.x. Credentials are passed
   the 1.8 way, as a 'username:password' token.
*/

const RETRY_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Integer(i64),
    Float(f64),
}

/// One measurement row, rendered to line protocol on write.
pub(crate) struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: SystemTime,
}

impl Point {
    pub fn new(measurement: &str, timestamp: SystemTime) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn int_field(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), FieldValue::Integer(value));
        self
    }

    pub fn float_field(mut self, key: &str, value: f64) -> Self {
        self.fields.insert(key.to_string(), FieldValue::Float(value));
        self
    }

    fn to_line_protocol(&self) -> Result<String> {
        if self.fields.is_empty() {
            bail!("A point needs at least one field!");
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        let fields = self
            .fields
            .iter()
            .map(|(key, value)| match value {
                FieldValue::Integer(i) => format!("{}={}i", escape_key(key), i),
                FieldValue::Float(f) => format!("{}={}", escape_key(key), f),
            })
            .collect::<Vec<_>>()
            .join(",");
        line.push_str(&fields);

        let nanos = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .context("Point timestamp predates the epoch!")?
            .as_nanos();
        line.push(' ');
        line.push_str(&nanos.to_string());

        Ok(line)
    }
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,

    #[serde(default)]
    message: Option<String>,
}

pub(crate) struct InfluxClient {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    auth_token: Option<String>,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .context("Failed to build InfluxDB HTTP client!")?;

        let auth_token = if config.username.is_empty() && config.password.is_empty() {
            None
        } else {
            Some(format!("Token {}:{}", config.username, config.password))
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            auth_token,
        })
    }

    /// One-shot startup check against the /health endpoint.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach InfluxDB at {url}!"))?;

        let body = response
            .text()
            .await
            .context("Failed to read InfluxDB health response!")?;
        let health: HealthResponse = serde_json::from_str(&body)
            .context("Failed to parse InfluxDB health response!")?;

        if health.status != "pass" {
            bail!(
                "InfluxDB did not pass health check: status {}; message '{}'",
                health.status,
                health.message.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }

    pub async fn write(&self, point: &Point) -> Result<()> {
        let url = format!("{}/api/v2/write", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .query(&[("bucket", self.bucket.as_str()), ("precision", "ns")])
            .body(point.to_line_protocol()?);
        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach InfluxDB at {url}!"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("InfluxDB write failed with {status}: {body}");
        }
        Ok(())
    }

    /// Write with one retry after a short delay.
    pub async fn write_with_retry(&self, point: &Point) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.write(point).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempts += 1;
                    if attempts >= RETRY_ATTEMPTS {
                        return Err(e);
                    }
                    debug!("Write attempt {attempts}/{RETRY_ATTEMPTS} failed, retrying: {e:#}");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}
