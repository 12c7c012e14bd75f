use keeper_core::crypto::Cipher;
use keeper_core::Record;

use crate::commands::common::{
    client_cipher, format_record_lines, open_vault, record_to_list_item, RecordListItem,
};
use crate::config::ClientConfig;
use crate::error::CliError;
use crate::http::HttpClient;

pub async fn run_list(config: &ClientConfig, remote: bool, as_json: bool) -> Result<(), CliError> {
    let records = if remote {
        list_remote_records(config).await?
    } else {
        let (_, vault) = open_vault(config).await?;
        vault.list().await?
    };

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }

    for line in format_record_lines(&records) {
        println!("{line}");
    }
    Ok(())
}

/// The server's copy, decrypted with the local key.
async fn list_remote_records(config: &ClientConfig) -> Result<Vec<Record>, CliError> {
    let session = config.session_store().require()?;
    let cipher = client_cipher(config)?;
    let client = HttpClient::new(&config.server_url, config.sync_timeout)?.with_token(&session.token);

    let records = client.list_records().await?;
    records
        .iter()
        .map(|record| Ok(record.with_payload(cipher.decrypt(&record.payload)?)))
        .collect()
}
