//! Data behind a server.
//!
//! A [`Store`] resolves the target of a conversation's setup into a [`Cursor`]
//! over data points for stream conversations, and applies yielded points for
//! mutation conversations.
mod memory;

use async_trait::async_trait;

use crate::{
    data::{DataPoint, Setup},
    error::MishmashError,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait Cursor: Send {
    async fn next(&mut self) -> Result<Option<DataPoint>, MishmashError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a cursor over every point of the setup's target set.
    async fn open(&self, setup: &Setup) -> Result<Box<dyn Cursor>, MishmashError>;

    /// Applies one point according to the setup's mutation type.
    async fn write(&self, setup: &Setup, point: DataPoint) -> Result<(), MishmashError>;
}
