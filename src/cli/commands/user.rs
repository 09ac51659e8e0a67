use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::{open_services, OutputFormat};
use crate::types::Role;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Add a user to an existing tenant")]
    Add {
        #[arg(help = "Tenant slug")]
        tenant: String,

        #[arg(help = "User email")]
        email: String,

        #[arg(long, help = "Initial password")]
        password: String,

        #[arg(long, default_value = "member", value_parser = parse_role, help = "admin or member")]
        role: Role,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    raw.parse().map_err(|e: crate::guard::GuardError| e.to_string())
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let (_, service) = open_services().await?;

    match cmd {
        UserCommands::Add { tenant, email, password, role } => {
            let tenant = service.tenant_by_slug(&tenant).await?;
            let user = service.add_user(tenant.id, email.trim(), &password, role).await?;

            output_success(
                output_format,
                &format!("Added {} to '{}' as {}", user.email, tenant.slug, user.role),
                Some(json!({ "user_id": user.id, "tenant_id": tenant.id, "role": user.role })),
            )
        }
    }
}
