pub mod builder;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod protocol;
pub mod store;

pub use builder::SetBuilder;
pub use client::{MutationClient, StreamClient};
pub use command::Command;
pub use config::ConversationConfig;
pub use error::{ErrorCode, MishmashError};
pub use protocol::Server;
pub use store::{MemoryStore, Store};
