use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keeper_core::RecordKind;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Keep logins, cards, notes and files in a synced, encrypted vault")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server base URL (overrides SERVER_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Directory holding the local vault and session token (overrides KEEPER_CONFIG_DIR)
    #[arg(long, global = true, value_name = "PATH")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account on the server and sign in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session token
    Logout,
    /// Add a record
    ///
    /// Fields are `key=value` pairs for `login` (login, password, website, notes)
    /// and `card` (number, expiry, cvv, holder, bank, notes), free text for `text`.
    #[command(alias = "new")]
    Add {
        /// Record kind: login, text, binary or card
        kind: RecordKind,
        /// Record title
        #[arg(short, long)]
        title: String,
        /// Free-form metadata
        #[arg(short, long, default_value = "")]
        metadata: String,
        /// File to store (binary records)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Payload fields
        #[arg(trailing_var_arg = true)]
        fields: Vec<String>,
    },
    /// Show one record with its secret fields
    Get {
        /// Record ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Write the raw payload to a file instead
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List records
    List {
        /// List what the server holds instead of the local vault
        #[arg(long)]
        remote: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a record
    Edit {
        /// Record ID or unique ID prefix
        id: String,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New metadata
        #[arg(short, long)]
        metadata: Option<String>,
        /// Replacement file (binary records)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Payload fields to change
        #[arg(trailing_var_arg = true)]
        fields: Vec<String>,
    },
    /// Delete a record
    Delete {
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Show past versions of a record
    History {
        /// Record ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Exchange changes with the server
    Sync,
}
