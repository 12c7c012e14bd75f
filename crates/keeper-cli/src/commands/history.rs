use crate::commands::common::{format_timestamp, open_vault, preview, resolve_record_id};
use crate::config::ClientConfig;
use crate::error::CliError;

pub async fn run_history(config: &ClientConfig, id: &str, as_json: bool) -> Result<(), CliError> {
    let (_, vault) = open_vault(config).await?;
    let record_id = resolve_record_id(id, &vault).await?;
    let entries = vault.history(&record_id).await.map_err(|error| match error {
        keeper_core::Error::NotFound(_) => CliError::RecordNotFound(id.to_string()),
        other => other.into(),
    })?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "v{:<4}  {}  {}",
            entry.version,
            format_timestamp(&entry.updated_at),
            preview(&entry.title, 40)
        );
    }
    Ok(())
}
