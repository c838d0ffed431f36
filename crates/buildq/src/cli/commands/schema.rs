use anyhow::{Context, Result};
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct SchemaArgs {
    /// Print the SQLite DDL instead of the build view JSON schema.
    #[arg(long, default_value_t = false)]
    pub ddl: bool,
}

pub fn run(args: &SchemaArgs) -> Result<()> {
    if args.ddl {
        println!("{}", crate::db::create_schema_sql());
        return Ok(());
    }

    let encoded = serde_json::to_string_pretty(&crate::models::json_schema())
        .context("failed to encode build view schema")?;
    println!("{encoded}");
    Ok(())
}
