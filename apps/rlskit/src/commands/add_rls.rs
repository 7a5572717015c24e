//! `rlskit add-rls`: write an up/down migration pair for one table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rlskit_db::{PolicyCommand, PolicyField, RlsPolicy, SqlType};

use crate::config::AppConfig;

#[derive(Debug, Args)]
pub struct AddRlsArgs {
    /// Table to protect, optionally schema-qualified
    pub table: String,

    /// Fields to enforce (each must be listed in rls.enforce_fields)
    #[arg(long, num_args = 1.., required = true)]
    pub fields: Vec<String>,

    /// Cast type of a field, e.g. `--type tenant_id=uuid` (repeatable)
    #[arg(short = 't', long = "type", value_parser = parse_type_override)]
    pub types: Vec<(String, SqlType)>,

    /// Statement kind the policy applies to
    #[arg(long, default_value = "all")]
    pub command: PolicyCommand,

    /// Policy name [default: <table>_rls_policy]
    #[arg(long)]
    pub policy_name: Option<String>,

    /// Output directory [default: policy.out_dir]
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print the scripts instead of writing files
    #[arg(long)]
    pub stdout: bool,
}

fn parse_type_override(s: &str) -> Result<(String, SqlType), String> {
    let (field, ty) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=TYPE, got '{s}'"))?;
    let ty = ty.parse::<SqlType>().map_err(|e| e.to_string())?;
    Ok((field.to_owned(), ty))
}

/// Per-field cast type: `--type` first, then `policy.field_types`, then text.
fn resolve_types(
    fields: &[String],
    overrides: &[(String, SqlType)],
    configured: &BTreeMap<String, SqlType>,
) -> Vec<PolicyField> {
    fields
        .iter()
        .map(|f| {
            let ty = overrides
                .iter()
                .rev()
                .find(|(name, _)| name == f)
                .map(|(_, ty)| *ty)
                .or_else(|| configured.get(f).copied())
                .unwrap_or_default();
            PolicyField::new(f.clone(), ty)
        })
        .collect()
}

pub fn run(config: &AppConfig, args: AddRlsArgs) -> Result<()> {
    let fields = resolve_types(&args.fields, &args.types, &config.policy.field_types);
    let mut policy = RlsPolicy::new(&config.rls, &args.table, fields)?.with_command(args.command);
    if let Some(name) = &args.policy_name {
        policy = policy.with_name(name)?;
    }

    let up = render(&policy, "up", &policy.up_sql());
    let down = render(&policy, "down", &policy.down_sql());

    if args.stdout {
        println!("{up}\n{down}");
        return Ok(());
    }

    let out_dir = args.out_dir.unwrap_or_else(|| config.policy.out_dir.clone());
    let stem = format!(
        "{}_add_rls_policy_to_{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        policy.table_name()
    );
    let up_path = write(&out_dir, &format!("{stem}.up.sql"), &up)?;
    let down_path = write(&out_dir, &format!("{stem}.down.sql"), &down)?;

    tracing::info!(
        policy = policy.name(),
        table = %args.table,
        "RLS migration created"
    );
    println!("Created {}", up_path.display());
    println!("Created {}", down_path.display());
    Ok(())
}

fn render(policy: &RlsPolicy, direction: &str, sql: &str) -> String {
    let fields: Vec<_> = policy
        .fields()
        .iter()
        .map(|f| format!("{}::{}", f.name, f.sql_type))
        .collect();
    format!(
        "-- {direction}: policy {} on {} for {} ({})\n{sql}",
        policy.name(),
        policy.table_name(),
        policy.command(),
        fields.join(", ")
    )
}

fn write(dir: &Path, file: &str, contents: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(file);
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
