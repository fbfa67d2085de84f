use crate::config::UpsConfig;
use crate::heartbeat::Heartbeat;
use crate::influx::{InfluxClient, Point};
use crate::nut;
use anyhow::{Context, Result};
use log::{debug, error, info};
use std::time::{Duration, SystemTime};

/*
   Reads one round of UPS statistics through upsc each poll interval,
   builds an InfluxDB point and writes it. The heartbeat only hears
   about cycles whose write actually succeeded.
*/

pub(crate) struct Poller {
    ups: String,
    name_tag: String,
    measurement: String,
    print_usage: bool,
    interval: Duration,
    influx: InfluxClient,
    heartbeat: Option<Heartbeat>,
}

impl Poller {
    pub fn new(
        config: &UpsConfig,
        measurement: String,
        influx: InfluxClient,
        heartbeat: Option<Heartbeat>,
    ) -> Self {
        Self {
            ups: config.ups.clone(),
            name_tag: config.name_tag.clone(),
            measurement,
            print_usage: config.print_usage,
            interval: Duration::from_secs(config.poll_interval),
            influx,
            heartbeat,
        }
    }

    /// Poll forever. A failed cycle is logged and skipped, never fatal.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.interval);

        debug!("Started with an interval of {} seconds!", self.interval.as_secs());
        loop {
            interval.tick().await;
            if let Err(e) = self.update().await {
                error!("{e:#}");
            }
        }
    }

    async fn update(&self) -> Result<()> {
        let at = SystemTime::now();

        let battery_charge = nut::read_int(&self.ups, "battery.charge").await?;
        let battery_charge_low = nut::read_int(&self.ups, "battery.charge.low").await?;
        let battery_runtime = nut::read_int(&self.ups, "battery.runtime").await?;
        let battery_voltage = nut::read_float(&self.ups, "battery.voltage").await?;
        let battery_voltage_nominal = nut::read_float(&self.ups, "battery.voltage.nominal").await?;
        let input_voltage = nut::read_float(&self.ups, "input.voltage").await?;
        let input_voltage_nominal = nut::read_float(&self.ups, "input.voltage.nominal").await?;
        let load = nut::read_int(&self.ups, "ups.load").await?;

        // Older models only expose the apparent power rating.
        let nominal_power = match nut::read_int(&self.ups, "ups.realpower.nominal").await {
            Ok(value) => value,
            Err(e) => match nut::read_int(&self.ups, "ups.power.nominal").await {
                Ok(value) => value,
                Err(e2) => {
                    error!("{e:#}");
                    return Err(e2);
                }
            },
        };

        let power = match nut::read_float(&self.ups, "ups.power").await {
            Ok(power) => {
                if self.print_usage {
                    info!("Current output for '{}': {power:.0} watts", self.ups);
                }
                power
            }
            Err(_) => {
                let approx = (nominal_power as f64 * load as f64 / 100.0).round();
                if self.print_usage {
                    info!("Current approx. output for '{}': {approx:.0} watts", self.ups);
                }
                approx
            }
        };

        let mut point = Point::new(&self.measurement, at)
            .tag("ups_name", &self.name_tag)
            .float_field("watts", power) // kept for dashboards predating the power field
            .float_field("power", power)
            .int_field("power_nominal", nominal_power)
            .int_field("load_percent", load)
            .int_field("battery_charge_percent", battery_charge)
            .int_field("battery_charge_low_percent", battery_charge_low)
            .int_field("battery_runtime_s", battery_runtime)
            .float_field("battery_voltage", battery_voltage)
            .float_field("battery_voltage_nominal", battery_voltage_nominal)
            .float_field("input_voltage", input_voltage)
            .float_field("input_voltage_nominal", input_voltage_nominal);

        // Optional readings, not every model exposes these.
        point = self.optional_float(point, "output.voltage", "output_voltage").await;
        point = self
            .optional_float(point, "output.voltage.nominal", "output_voltage_nominal")
            .await;
        point = self.optional_float(point, "output.current", "output_current").await;
        point = self
            .optional_int(point, "battery.charge.warning", "battery_charge_warning_percent")
            .await;
        match nut::read_float(&self.ups, "battery.temperature").await {
            Ok(temperature) => {
                point = point
                    .float_field("battery_temperature_c", temperature)
                    .float_field("battery_temperature_f", (temperature * 9.0 / 5.0 + 32.0).round());
            }
            Err(e) => debug!("{e:#}"),
        }
        point = self.optional_float(point, "input.frequency", "input_frequency").await;
        point = self.optional_float(point, "output.frequency", "output_frequency").await;
        point = self
            .optional_float(point, "output.frequency.nominal", "output_frequency_nominal")
            .await;

        self.influx
            .write_with_retry(&point)
            .await
            .context("Failed to write point to InfluxDB")?;

        // Liveness evidence carries the capture time, not the write time.
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.alive(at).await;
        }
        Ok(())
    }

    async fn optional_int(&self, point: Point, key: &str, field: &str) -> Point {
        match nut::read_int(&self.ups, key).await {
            Ok(value) => point.int_field(field, value),
            Err(e) => {
                debug!("{e:#}");
                point
            }
        }
    }

    async fn optional_float(&self, point: Point, key: &str, field: &str) -> Point {
        match nut::read_float(&self.ups, key).await {
            Ok(value) => point.float_field(field, value),
            Err(e) => {
                debug!("{e:#}");
                point
            }
        }
    }
}
