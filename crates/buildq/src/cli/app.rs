use clap::{Parser, Subcommand};

use super::commands::{builds::BuildsArgs, schema::SchemaArgs};

#[derive(Debug, Parser)]
#[command(name = "buildq", version, about = "Batched build/property mart queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Builds(BuildsArgs),
    Schema(SchemaArgs),
}
