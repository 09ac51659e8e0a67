use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::{open_services, OutputFormat};
use crate::types::PlanTier;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Provision a free-tier tenant and its first admin")]
    Create {
        #[arg(help = "Tenant slug (lowercase, unique)")]
        slug: String,

        #[arg(long, help = "Display name (defaults to the slug)")]
        name: Option<String>,

        #[arg(long, help = "Email of the tenant's first admin")]
        admin_email: String,

        #[arg(long, help = "Password of the tenant's first admin")]
        admin_password: String,
    },

    #[command(about = "Change a tenant's subscription plan")]
    Upgrade {
        #[arg(help = "Tenant slug")]
        slug: String,

        #[arg(help = "Target plan (free or pro)", value_parser = parse_plan)]
        plan: PlanTier,
    },
}

fn parse_plan(raw: &str) -> Result<PlanTier, String> {
    raw.parse().map_err(|e: crate::guard::GuardError| e.to_string())
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let (store, service) = open_services().await?;

    match cmd {
        TenantCommands::Create { slug, name, admin_email, admin_password } => {
            let name = name.unwrap_or_else(|| slug.clone());
            let (tenant, admin) = service.provision(&slug, &name, &admin_email, &admin_password).await?;

            output_success(
                output_format,
                &format!("Created tenant '{}'", tenant.slug),
                Some(json!({
                    "tenant_id": tenant.id,
                    "plan": tenant.plan,
                    "admin_id": admin.id,
                    "admin_email": admin.email,
                })),
            )
        }
        TenantCommands::Upgrade { slug, plan } => {
            // Operator action: performed as the tenant itself, not a caller
            let tenant = service.tenant_by_slug(&slug).await?;
            let tenant = store.set_tenant_plan(tenant.id, plan).await?;
            tracing::info!(tenant = %tenant.id, plan = %plan, "Changed tenant plan from CLI");

            output_success(
                output_format,
                &format!("Tenant '{}' is now on the {} plan", tenant.slug, tenant.plan),
                Some(json!({ "tenant_id": tenant.id, "plan": tenant.plan })),
            )
        }
    }
}
