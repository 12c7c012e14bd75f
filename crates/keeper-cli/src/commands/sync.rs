use keeper_core::sync::{SyncCoordinator, SyncOutcome};

use crate::commands::common::{client_cipher, open_vault, preview, short_id};
use crate::config::ClientConfig;
use crate::error::CliError;
use crate::http::HttpClient;

pub async fn run_sync(config: &ClientConfig) -> Result<(), CliError> {
    let cipher = client_cipher(config)?;
    let (session, vault) = open_vault(config).await?;
    let transport =
        HttpClient::new(&config.server_url, config.sync_timeout)?.with_token(&session.token);

    let coordinator =
        SyncCoordinator::new(vault.store().clone(), cipher, transport, session.user_id())
            .with_timeout(config.sync_timeout);
    let outcome = coordinator.sync().await?;

    for line in format_sync_lines(&outcome) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_sync_lines(outcome: &SyncOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: sent {}, received {}, kept local {}",
        outcome.sent, outcome.applied, outcome.skipped
    )];
    for conflict in &outcome.conflicts {
        lines.push(format!(
            "conflict  {:<13}  {:<30}  {}  (local v{}, server v{})",
            short_id(&conflict.local.id.to_string()),
            preview(&conflict.local.title, 30),
            conflict.reason,
            conflict.local.version,
            conflict.server.version
        ));
    }
    lines
}
