use std::path::Path;

use keeper_core::RecordKind;

use crate::commands::common::{build_payload, open_vault};
use crate::config::ClientConfig;
use crate::error::CliError;

pub async fn run_add(
    config: &ClientConfig,
    kind: RecordKind,
    title: &str,
    metadata: &str,
    file: Option<&Path>,
    fields: &[String],
) -> Result<(), CliError> {
    let payload = build_payload(kind, fields, file)?;

    let (_, vault) = open_vault(config).await?;
    let record = vault.add(kind, title, payload, metadata).await?;

    println!("{}", record.id);
    Ok(())
}
