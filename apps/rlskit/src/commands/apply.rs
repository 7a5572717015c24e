//! `rlskit apply`: run a migration script, as the migration user when
//! configured.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use rlskit_db::{RlsDb, migration_dsn, redact_dsn};

use crate::config::AppConfig;

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// SQL script to execute
    pub file: PathBuf,

    /// Database URL [default: database.dsn]
    #[arg(long)]
    pub dsn: Option<String>,
}

pub async fn run(config: &AppConfig, args: ApplyArgs) -> Result<()> {
    let sql = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let dsn = args
        .dsn
        .or_else(|| config.database.dsn.clone())
        .context("no database URL: pass --dsn or set database.dsn")?;
    let dsn = migration_dsn(&dsn, &config.rls.migration_user)?;

    let db = RlsDb::connect(&dsn, &config.database.pool, Arc::new(config.rls.clone())).await?;
    tracing::info!(
        file = %args.file.display(),
        dsn = %redact_dsn(&dsn),
        "applying script"
    );
    let result = db.execute_script(&sql).await;
    db.close().await;
    result.with_context(|| format!("failed to apply {}", args.file.display()))?;

    println!("Applied {}", args.file.display());
    Ok(())
}
