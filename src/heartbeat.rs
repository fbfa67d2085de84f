use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/*
   Liveness heartbeat. The poller reports each successful write cycle
   through alive(); an independent timer GETs the watchdog URL for as
   long as that evidence stays fresh. Once the pipeline stalls the pings
   stop and the external watchdog raises the alarm on its own schedule.
*/

const MAX_CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Called with each failed heartbeat attempt, on its own task.
pub(crate) type OnError = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

pub(crate) struct HeartbeatConfig {
    /// Interval between heartbeat attempts.
    pub interval: Duration,

    /// Maximum age of the last alive() report before pings are withheld.
    pub liveness_threshold: Duration,

    /// URL to GET for each heartbeat.
    pub url: String,

    /// Failures are dropped silently when unset.
    pub on_error: Option<OnError>,
}

#[derive(Clone)]
pub(crate) struct Heartbeat {
    inner: Arc<HeartbeatInner>,
}

struct HeartbeatInner {
    interval: Duration,
    liveness_threshold: Duration,
    url: String,
    client: reqwest::Client,
    on_error: Option<OnError>,
    state: Mutex<HeartbeatState>,
}

struct HeartbeatState {
    last_alive: SystemTime,
    started: bool,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Result<Self> {
        if config.liveness_threshold.is_zero() {
            bail!("Heartbeat liveness threshold must be positive!");
        }
        if config.interval.is_zero() {
            bail!("Heartbeat interval must be positive!");
        }
        if config.url.is_empty() {
            bail!("Heartbeat URL must be set!");
        }

        // A single attempt may never block the timer for longer than one tick.
        let client = reqwest::Client::builder()
            .timeout(config.interval.min(MAX_CLIENT_TIMEOUT))
            .build()
            .context("Failed to build heartbeat HTTP client!")?;

        Ok(Self {
            inner: Arc::new(HeartbeatInner {
                interval: config.interval,
                liveness_threshold: config.liveness_threshold,
                url: config.url,
                client,
                on_error: config.on_error,
                state: Mutex::new(HeartbeatState {
                    last_alive: UNIX_EPOCH,
                    started: false,
                }),
            }),
        })
    }

    /// Record a successfully completed unit of work. The newest timestamp
    /// wins regardless of call order; older-or-equal reports are no-ops.
    pub async fn alive(&self, at: SystemTime) {
        let mut state = self.inner.state.lock().await;
        if state.last_alive < at {
            state.last_alive = at;
        }
    }

    /// Begin sending heartbeats. The first call spawns the periodic timer,
    /// every later call is a no-op. There is no stop: the timer task runs
    /// until the process exits.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        if state.started {
            return;
        }
        state.started = true;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // The first tick completes immediately; the first heartbeat
            // belongs one full interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.beat().await;
            }
        });
    }
}

impl HeartbeatInner {
    async fn beat(&self) {
        let fresh = {
            let state = self.state.lock().await;
            match SystemTime::now().duration_since(state.last_alive) {
                Ok(age) => age < self.liveness_threshold,
                // A last_alive ahead of the wall clock still counts as fresh.
                Err(_) => true,
            }
        };
        if !fresh {
            return;
        }

        if let Err(e) = self.send().await {
            if let Some(on_error) = &self.on_error {
                let on_error = Arc::clone(on_error);
                // The callback runs on its own task, never on the timer's.
                tokio::spawn(async move { on_error(e) });
            }
        }
    }

    async fn send(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send heartbeat to '{}': {e}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Failed to send heartbeat to '{}': {status}", self.url);
        }
        Ok(())
    }
}
