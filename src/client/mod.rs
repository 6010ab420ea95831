//! Client ends of the two conversation kinds.
//!
//! Both clients run their conversation on a spawned task and talk to it
//! through channels. Opening a client completes the setup handshake first, so
//! a client that was returned is ready for data.
//!
//! ```no_run
//! use mishmash::{
//!     builder::SetBuilder,
//!     client::StreamClient,
//!     config::ConversationConfig,
//! };
//!
//! # async fn run() -> Result<(), mishmash::MishmashError> {
//! let mut builder = SetBuilder::new();
//! builder
//!     .enter_intersection()?
//!     .add_instance("A")?
//!     .leave_intersection()?;
//!
//! let address = "127.0.0.1:7070".parse().unwrap();
//! let mut client =
//!     StreamClient::connect(address, builder.build()?, &ConversationConfig::default()).await?;
//! while let Some(point) = client.get().await? {
//!     println!("{point}");
//! }
//! client.close().await
//! # }
//! ```
mod mutation;
mod stream;

use tokio::{sync::oneshot, task::JoinHandle};

use crate::{error::MishmashError, protocol::Outcome};

pub use mutation::MutationClient;
pub use stream::StreamClient;

type DriverHandle = JoinHandle<Result<(), MishmashError>>;

/// Waits until the conversation reaches its data phase.
async fn opened(
    opened: oneshot::Receiver<()>,
    driver: DriverHandle,
    outcome: &Outcome,
) -> Result<DriverHandle, MishmashError> {
    match opened.await {
        Ok(()) => Ok(driver),
        Err(_) => {
            finish(driver).await?;
            Err(outcome.error())
        }
    }
}

/// Collects the result of a conversation task.
async fn finish(driver: DriverHandle) -> Result<(), MishmashError> {
    driver
        .await
        .map_err(|e| MishmashError::Internal(format!("conversation task failed: {e}")))?
}
