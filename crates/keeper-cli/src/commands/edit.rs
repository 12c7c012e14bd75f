use std::path::PathBuf;

use keeper_core::services::RecordUpdate;

use crate::commands::common::{open_vault, patch_payload, resolve_record};
use crate::config::ClientConfig;
use crate::error::CliError;

/// What `keeper edit` was asked to change.
#[derive(Debug, Default)]
pub struct EditArgs {
    pub title: Option<String>,
    pub metadata: Option<String>,
    pub file: Option<PathBuf>,
    pub fields: Vec<String>,
}

pub async fn run_edit(config: &ClientConfig, id: &str, args: EditArgs) -> Result<(), CliError> {
    let (_, vault) = open_vault(config).await?;
    let record = resolve_record(id, &vault).await?;

    let update = RecordUpdate {
        title: args.title,
        payload: patch_payload(&record, &args.fields, args.file.as_deref())?,
        metadata: args.metadata,
    };
    if update.is_empty() {
        return Err(CliError::EmptyEdit);
    }

    let saved = vault.edit(&record.id, update).await?;
    println!("{} (version {})", saved.id, saved.version);
    Ok(())
}
