use std::env;

use anyhow::Context;
use log::info;
use machine_learning::arch::Model;

use corrosion_trainer::configs::{SessionBuilder, TrainerConfig};

const DEFAULT_CONFIG: &str = "trainer.json";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = TrainerConfig::from_file(&path).with_context(|| format!("loading {path}"))?;
    info!("loaded config from {path}");

    let session = SessionBuilder::new().build(&config).context("building the session")?;
    let model = session.run(&config).context("training")?;

    info!(
        "best model restored ({} parameters), snapshots and logs are in {}",
        model.size(),
        config.out_dir.display()
    );

    Ok(())
}
