use crate::commands::common::{open_vault, resolve_record};
use crate::config::ClientConfig;
use crate::error::CliError;

pub async fn run_delete(config: &ClientConfig, id: &str) -> Result<(), CliError> {
    let (_, vault) = open_vault(config).await?;
    let record = resolve_record(id, &vault).await?;

    vault.remove(&record.id).await?;
    println!("{}", record.id);
    Ok(())
}
