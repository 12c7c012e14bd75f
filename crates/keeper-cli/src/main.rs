//! Keeper CLI - a secrets vault for the terminal
//!
//! Records live in a local vault and are synced, encrypted, with the
//! keeper-api server.

mod cli;
mod commands;
mod config;
mod error;
mod http;
mod session;

#[cfg(test)]
mod tests;

use clap::Parser;

use cli::{Cli, Commands};
use commands::{
    run_add, run_delete, run_edit, run_get, run_history, run_list, run_login, run_logout,
    run_register, run_sync, EditArgs,
};
use config::ClientConfig;
use error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keeper=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env(cli.server, cli.config_dir)?;
    tracing::debug!(?config, "Resolved client config");

    match cli.command {
        Commands::Register {
            username,
            email,
            password,
        } => run_register(&config, &username, &email, &password).await?,
        Commands::Login { username, password } => {
            run_login(&config, &username, &password).await?;
        }
        Commands::Logout => run_logout(&config)?,
        Commands::Add {
            kind,
            title,
            metadata,
            file,
            fields,
        } => run_add(&config, kind, &title, &metadata, file.as_deref(), &fields).await?,
        Commands::Get { id, json, output } => {
            run_get(&config, &id, json, output.as_deref()).await?;
        }
        Commands::List { remote, json } => run_list(&config, remote, json).await?,
        Commands::Edit {
            id,
            title,
            metadata,
            file,
            fields,
        } => {
            let args = EditArgs {
                title,
                metadata,
                file,
                fields,
            };
            run_edit(&config, &id, args).await?;
        }
        Commands::Delete { id } => run_delete(&config, &id).await?,
        Commands::History { id, json } => run_history(&config, &id, json).await?,
        Commands::Sync => run_sync(&config).await?,
    }

    Ok(())
}
