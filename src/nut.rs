use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

/*
   Thin wrapper around the NUT `upsc` tool. Every reading is one
   `upsc <ups> <key>` invocation with the value on stdout.
*/

pub(crate) async fn read(ups: &str, key: &str) -> Result<String> {
    let output = Command::new("upsc")
        .arg(ups)
        .arg(key)
        .output()
        .await
        .with_context(|| format!("Failed to run upsc for {key}!"))?;

    if !output.status.success() {
        return Err(anyhow!("Failed to read {}: upsc exited with {}", key, output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub(crate) async fn read_int(ups: &str, key: &str) -> Result<i64> {
    let value = read(ups, key).await?;
    value
        .parse::<i64>()
        .map_err(|e| anyhow!("Failed to parse {key} '{value}' as an integer: {e}"))
}

pub(crate) async fn read_float(ups: &str, key: &str) -> Result<f64> {
    let value = read(ups, key).await?;
    value
        .parse::<f64>()
        .map_err(|e| anyhow!("Failed to parse {key} '{value}' as a float: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_ups_reports_the_key() {
        // Fails whether upsc is missing or the target does not exist.
        let err = read_int("no-such-ups@localhost", "battery.charge")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("battery.charge"));
    }
}
