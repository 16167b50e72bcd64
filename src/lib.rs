pub mod balance_source;
pub mod commands;
pub mod config;
pub mod data;
pub mod enforcement;
pub mod error;
pub mod handlers;
pub mod i18n;
pub mod logging;
pub mod membership;
pub mod notify;
pub mod status;
pub mod store;
pub mod sync;
pub mod transport;

pub const BOT_NAME: &str = "balance_warden";
pub const COMMAND_TARGET: &str = "balance_warden::command";
pub const ERROR_TARGET: &str = "balance_warden::error";
pub const EVENT_TARGET: &str = "balance_warden::handlers";
pub const CONSOLE_TARGET: &str = "balance_warden";
/// Sync cycle events
pub const SYNC_TARGET: &str = "balance_warden::sync";
/// Per-member enforcement decisions
pub const ENFORCEMENT_TARGET: &str = "balance_warden::enforcement";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
