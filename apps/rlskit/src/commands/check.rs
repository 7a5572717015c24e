use anyhow::Result;

use crate::config::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    tracing::info!("checking configuration");
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}
