//! Conversation states and the standard handshake states.
//!
//! A conversation is a chain of [`StreamState`]s driven one at a time by the
//! [`StreamDriver`](super::driver::StreamDriver). Each state may consume
//! inbound messages and produce outbound ones. Once its output is exhausted
//! the driver asks it for the next state.
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::time::{Instant, sleep_until};

use crate::{builder::SetBuilder, data::Setup, error::MishmashError};

use super::{
    decode::decode_setup,
    message::{ClientMessage, Message, SeqNo, ServerMessage},
};

pub type BoxedState<I, O> = Box<dyn StreamState<I, O>>;

/// One phase of a conversation.
///
/// The driver calls `enter` once, then interleaves `validate_input`/`input`
/// for every inbound message with `output` until `output` yields `None`, and
/// finally `leave`. `on_error` and `on_close` are only called on teardown.
#[async_trait]
pub trait StreamState<I, O>: Send
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn name(&self) -> &'static str;

    /// Resolves when the state is ready; no output is requested before that.
    async fn enter(&mut self) -> Result<(), MishmashError> {
        Ok(())
    }

    /// Checks an inbound message without changing anything.
    fn validate_input(&self, input: &I) -> Result<(), MishmashError>;

    fn input(&mut self, input: I) -> Result<(), MishmashError>;

    /// Next outbound message, or `None` once the state has nothing more to say.
    ///
    /// The returned future is dropped whenever an inbound message arrives and
    /// `output` is called again afterwards, so it must be cancel-safe.
    async fn output(&mut self, seq_no: SeqNo) -> Result<Option<O>, MishmashError>;

    /// Hands over to the next state, `None` ends the conversation.
    fn leave(self: Box<Self>) -> Option<BoxedState<I, O>>;

    fn on_error(&mut self, _error: &MishmashError) {}

    /// Releases resources at final termination.
    fn on_close(&mut self) -> Result<(), MishmashError> {
        Ok(())
    }
}

/// Sends the setup message once, then waits for its acknowledgement before
/// handing over to `next`.
pub struct SendSetup<I, O> {
    setup: Option<O>,
    sent_seq_no: Option<SeqNo>,
    ack_timeout: Duration,
    next: Option<BoxedState<I, O>>,
}

impl<I, O> SendSetup<I, O>
where
    I: ServerMessage,
    O: ClientMessage,
{
    pub fn new(setup: O, ack_timeout: Duration, next: BoxedState<I, O>) -> Self {
        Self {
            setup: Some(setup),
            sent_seq_no: None,
            ack_timeout,
            next: Some(next),
        }
    }
}

#[async_trait]
impl<I, O> StreamState<I, O> for SendSetup<I, O>
where
    I: ServerMessage,
    O: ClientMessage,
{
    fn name(&self) -> &'static str {
        "send-setup"
    }

    fn validate_input(&self, input: &I) -> Result<(), MishmashError> {
        Err(MishmashError::InvalidState(format!(
            "no input expected before the setup is sent, received {}",
            input.alt_name()
        )))
    }

    fn input(&mut self, _input: I) -> Result<(), MishmashError> {
        Ok(())
    }

    async fn output(&mut self, seq_no: SeqNo) -> Result<Option<O>, MishmashError> {
        let setup = self.setup.take();
        if setup.is_some() {
            self.sent_seq_no = Some(seq_no);
        }
        Ok(setup)
    }

    fn leave(self: Box<Self>) -> Option<BoxedState<I, O>> {
        let next = self.next?;
        match self.sent_seq_no {
            Some(seq_no) => Some(Box::new(WaitSetupAck::new(self.ack_timeout, seq_no, next))),
            None => Some(next),
        }
    }
}

/// Waits for the server to acknowledge the setup sent as `setup_seq_no`.
pub struct WaitSetupAck<I, O> {
    timeout: Duration,
    setup_seq_no: SeqNo,
    deadline: Option<Instant>,
    acknowledged: bool,
    next: Option<BoxedState<I, O>>,
}

impl<I, O> WaitSetupAck<I, O>
where
    I: ServerMessage,
    O: Message,
{
    pub fn new(timeout: Duration, setup_seq_no: SeqNo, next: BoxedState<I, O>) -> Self {
        Self {
            timeout,
            setup_seq_no,
            deadline: None,
            acknowledged: false,
            next: Some(next),
        }
    }
}

#[async_trait]
impl<I, O> StreamState<I, O> for WaitSetupAck<I, O>
where
    I: ServerMessage,
    O: Message,
{
    fn name(&self) -> &'static str {
        "wait-setup-ack"
    }

    fn validate_input(&self, input: &I) -> Result<(), MishmashError> {
        let Some(ack) = input.as_setup_ack() else {
            return Err(MishmashError::Protocol(format!(
                "expected SETUP_ACK, received {}",
                input.alt_name()
            )));
        };
        if self.acknowledged {
            return Err(MishmashError::Protocol("duplicate SETUP_ACK".to_string()));
        }
        if ack.ack_seq_no != self.setup_seq_no {
            return Err(MishmashError::Protocol(format!(
                "SETUP_ACK for #{} while waiting for #{}",
                ack.ack_seq_no, self.setup_seq_no
            )));
        }
        Ok(())
    }

    fn input(&mut self, _input: I) -> Result<(), MishmashError> {
        debug!("setup #{} acknowledged", self.setup_seq_no);
        self.acknowledged = true;
        Ok(())
    }

    async fn output(&mut self, _seq_no: SeqNo) -> Result<Option<O>, MishmashError> {
        if self.acknowledged {
            return Ok(None);
        }

        let timeout = self.timeout;
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + timeout);
        sleep_until(deadline).await;

        Err(MishmashError::Timeout(format!(
            "setup not acknowledged within {} ms",
            timeout.as_millis()
        )))
    }

    fn leave(self: Box<Self>) -> Option<BoxedState<I, O>> {
        self.next
    }
}

/// Builds the state that serves a conversation once its setup is known.
pub type NextState<I, O> = Box<dyn FnOnce(Setup) -> BoxedState<I, O> + Send>;

/// Server side of the handshake: waits for the setup, replays it through a
/// fresh builder and acknowledges it.
pub struct WaitSetup<I, O> {
    timeout: Duration,
    deadline: Option<Instant>,
    setup_seq_no: Option<SeqNo>,
    acknowledged: bool,
    prepare_next: Option<NextState<I, O>>,
    next: Option<BoxedState<I, O>>,
}

impl<I, O> WaitSetup<I, O>
where
    I: ClientMessage,
    O: ServerMessage,
{
    pub fn new(timeout: Duration, prepare_next: NextState<I, O>) -> Self {
        Self {
            timeout,
            deadline: None,
            setup_seq_no: None,
            acknowledged: false,
            prepare_next: Some(prepare_next),
            next: None,
        }
    }
}

#[async_trait]
impl<I, O> StreamState<I, O> for WaitSetup<I, O>
where
    I: ClientMessage,
    O: ServerMessage,
{
    fn name(&self) -> &'static str {
        "wait-setup"
    }

    fn validate_input(&self, input: &I) -> Result<(), MishmashError> {
        if !input.is_setup() {
            return Err(MishmashError::Protocol(format!(
                "expected SETUP, received {}",
                input.alt_name()
            )));
        }
        if self.setup_seq_no.is_some() {
            return Err(MishmashError::Protocol("duplicate SETUP".to_string()));
        }
        Ok(())
    }

    fn input(&mut self, input: I) -> Result<(), MishmashError> {
        let seq_no = input.seq_no();
        let setup = input
            .into_setup()
            .ok_or_else(|| MishmashError::Protocol("SETUP cannot be null".to_string()))?;

        let mut builder = SetBuilder::new();
        decode_setup(&setup, &mut builder)?;
        let setup = builder.build()?;
        debug!("received setup with {} target member(s)", setup.target.len());

        let prepare_next = self
            .prepare_next
            .take()
            .ok_or_else(|| MishmashError::InvalidState("setup already handled".to_string()))?;
        self.next = Some(prepare_next(setup));
        self.setup_seq_no = Some(seq_no);
        Ok(())
    }

    async fn output(&mut self, _seq_no: SeqNo) -> Result<Option<O>, MishmashError> {
        if let Some(ack_seq_no) = self.setup_seq_no {
            if self.acknowledged {
                return Ok(None);
            }
            self.acknowledged = true;
            return Ok(Some(O::setup_ack(ack_seq_no)));
        }

        let timeout = self.timeout;
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + timeout);
        sleep_until(deadline).await;

        Err(MishmashError::Timeout(format!(
            "setup not received within {} ms",
            timeout.as_millis()
        )))
    }

    fn leave(self: Box<Self>) -> Option<BoxedState<I, O>> {
        self.next
    }

    fn on_error(&mut self, error: &MishmashError) {
        if let Some(next) = self.next.as_mut() {
            next.on_error(error);
        }
    }

    fn on_close(&mut self) -> Result<(), MishmashError> {
        match self.next.as_mut() {
            Some(next) => next.on_close(),
            None => Ok(()),
        }
    }
}
