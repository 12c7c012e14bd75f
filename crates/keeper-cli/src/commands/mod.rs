mod add;
mod auth_cmd;
pub mod common;
mod delete;
mod edit;
mod get;
mod history;
mod list;
mod sync;

pub use add::run_add;
pub use auth_cmd::{run_login, run_logout, run_register};
pub use delete::run_delete;
pub use edit::{run_edit, EditArgs};
pub use get::run_get;
pub use history::run_history;
pub use list::run_list;
pub use sync::{format_sync_lines, run_sync};
