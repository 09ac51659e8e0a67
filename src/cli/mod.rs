pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::database::{self, StoreRef};
use crate::guard::TenantGuard;
use crate::services::TenantService;

#[derive(Parser)]
#[command(name = "notesctl")]
#[command(about = "Operator CLI for the multi-tenant notes service")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Create or update the database schema")]
    Migrate,

    #[command(about = "Tenant provisioning and plan management")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "User management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Mint a bearer token for an existing user")]
    Token {
        #[arg(help = "User email")]
        email: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Store and tenant service for commands that act on data
pub(crate) async fn open_services() -> anyhow::Result<(StoreRef, TenantService)> {
    let store = database::open_store().await?;
    let service = TenantService::new(store.clone(), TenantGuard::from_config());
    Ok((store, service))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Token { email } => commands::token::handle(&email, output_format).await,
    }
}
