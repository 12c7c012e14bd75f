use keeper_core::models::{AuthResponse, LoginRequest, RegisterRequest};

use crate::config::ClientConfig;
use crate::error::CliError;
use crate::http::HttpClient;

pub async fn run_register(
    config: &ClientConfig,
    username: &str,
    email: &str,
    password: &str,
) -> Result<(), CliError> {
    let request = RegisterRequest {
        username: username.trim().to_string(),
        email: email.trim().to_string(),
        password: password.to_string(),
    };
    request.validate()?;

    let client = HttpClient::new(&config.server_url, config.sync_timeout)?;
    let auth = client.register(&request).await?;
    store_session(config, &auth)?;
    println!("Registered and signed in as {}", auth.user.username);
    Ok(())
}

pub async fn run_login(
    config: &ClientConfig,
    username: &str,
    password: &str,
) -> Result<(), CliError> {
    let request = LoginRequest {
        username: username.trim().to_string(),
        password: password.to_string(),
    };

    let client = HttpClient::new(&config.server_url, config.sync_timeout)?;
    let auth = client.login(&request).await?;
    store_session(config, &auth)?;
    println!(
        "Signed in as {} (expires_at={})",
        auth.user.username,
        auth.expires_at.to_rfc3339()
    );
    Ok(())
}

pub fn run_logout(config: &ClientConfig) -> Result<(), CliError> {
    if config.session_store().clear()? {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

fn store_session(config: &ClientConfig, auth: &AuthResponse) -> Result<(), CliError> {
    let session = config.session_store().save(&auth.token)?;
    tracing::debug!(user = %session.user_id(), "Stored session token");
    Ok(())
}
