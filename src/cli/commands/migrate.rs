use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let manager = DatabaseManager::connect().await?;
    manager.migrate().await?;
    manager.close().await;

    output_success(output_format, "Database schema is up to date", None)
}
