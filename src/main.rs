// Records one scripted session from synthetic sources into the output directory

use overlay_recorder_lib::config::AppConfig;
use overlay_recorder_lib::recorder::Phase;
use overlay_recorder_lib::utils::error::ErrorResponse;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    overlay_recorder_lib::init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("overlay-recorder.json"));

    let config = AppConfig::load(&config_path)?;

    match overlay_recorder_lib::run(config).await {
        Ok(status) if status.phase == Phase::Error => {
            anyhow::bail!(status.text())
        }
        Ok(status) => {
            println!("{}", status.text());
            Ok(())
        }
        Err(e) => {
            let response = ErrorResponse::from(e);
            eprintln!("{}", serde_json::to_string(&response)?);
            anyhow::bail!("{}: {}", response.code, response.message)
        }
    }
}
