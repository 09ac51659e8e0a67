use serde_json::json;

use crate::auth;
use crate::cli::utils::output_success;
use crate::cli::{open_services, OutputFormat};

pub async fn handle(email: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let (store, _) = open_services().await?;

    let user = store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No user with email '{}'", email))?;
    let token = auth::issue_token(&user.principal())?;

    match output_format {
        crate::cli::OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
        crate::cli::OutputFormat::Json => output_success(
            output_format,
            "Issued token",
            Some(json!({ "token": token, "user_id": user.id, "tenant_id": user.tenant_id, "role": user.role })),
        ),
    }
}
