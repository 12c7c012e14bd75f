use std::path::Path;

use crate::commands::common::{
    format_timestamp, open_vault, payload_value, record_to_detail, resolve_record,
};
use crate::config::ClientConfig;
use crate::error::CliError;

pub async fn run_get(
    config: &ClientConfig,
    id: &str,
    as_json: bool,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let (_, vault) = open_vault(config).await?;
    let record = resolve_record(id, &vault).await?;

    if let Some(path) = output {
        std::fs::write(path, &record.payload)?;
        println!("Wrote {} bytes to {}", record.payload.len(), path.display());
        return Ok(());
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record_to_detail(&record))?);
        return Ok(());
    }

    println!("id:       {}", record.id);
    println!("kind:     {}", record.kind);
    println!("title:    {}", record.title);
    if !record.metadata.is_empty() {
        println!("metadata: {}", record.metadata);
    }
    println!("version:  {}", record.version);
    println!("updated:  {}", format_timestamp(&record.updated_at));

    match payload_value(&record) {
        serde_json::Value::Object(fields) => {
            for (key, value) in fields {
                let value = value
                    .as_str()
                    .map_or_else(|| value.to_string(), ToString::to_string);
                println!("{key}: {value}");
            }
        }
        serde_json::Value::String(text) => {
            println!();
            println!("{text}");
        }
        other => println!("{other}"),
    }
    Ok(())
}
