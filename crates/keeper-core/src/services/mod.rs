//! Higher-level services shared by clients.

mod vault;

pub use vault::{RecordUpdate, VaultService};
