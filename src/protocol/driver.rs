use std::{
    collections::VecDeque,
    sync::{Arc, OnceLock},
};

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::{config::ConversationConfig, error::MishmashError};

use super::{
    message::{ErrorMessage, Message, SeqNo},
    state::{BoxedState, StreamState},
    transport::Duplex,
};

/// First error that terminated a conversation, shared with its owner.
#[derive(Debug, Clone, Default)]
pub struct Outcome(Arc<OnceLock<MishmashError>>);

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` unless another one was recorded first.
    pub fn fail(&self, error: MishmashError) -> bool {
        self.0.set(error).is_ok()
    }

    pub fn failure(&self) -> Option<&MishmashError> {
        self.0.get()
    }

    /// The recorded error, or a generic one when the conversation simply ended.
    pub fn error(&self) -> MishmashError {
        self.0
            .get()
            .cloned()
            .unwrap_or_else(|| MishmashError::Protocol("conversation closed".to_string()))
    }
}

enum Event<I, O> {
    Output(Result<Option<O>, MishmashError>),
    Inbound(Option<Result<I, MishmashError>>),
    Cancelled,
}

/// Runs a chain of states over one transport.
///
/// The driver is the only owner of the transport, the current state and the
/// outbound sequence counter, so every message is stamped in send order.
pub struct StreamDriver<I, O, T> {
    transport: T,
    state: Option<BoxedState<I, O>>,
    seq_no: SeqNo,
    cancel: CancellationToken,
    outcome: Outcome,
}

impl<I, O, T> StreamDriver<I, O, T>
where
    I: Message,
    O: Message,
    T: Duplex<I, O>,
{
    pub fn new(transport: T, initial: BoxedState<I, O>, config: &ConversationConfig) -> Self {
        Self {
            transport,
            state: Some(initial),
            seq_no: config.initial_seq_no,
            cancel: CancellationToken::new(),
            outcome: Outcome::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome.clone()
    }

    pub async fn run(mut self) -> Result<(), MishmashError> {
        match self.drive().await {
            Ok(()) => {
                self.close().await;
                Ok(())
            }
            Err(err) => {
                warn!("conversation failed: {err}");
                self.teardown(&err).await;
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<(), MishmashError> {
        let Self {
            transport,
            state: slot,
            seq_no,
            cancel,
            ..
        } = self;
        let mut peer_closed = false;

        while let Some(state) = slot.as_mut() {
            debug!("entering state {}", state.name());

            let mut buffered = VecDeque::new();
            {
                let enter = state.enter();
                tokio::pin!(enter);
                loop {
                    tokio::select! {
                        biased;
                        entered = &mut enter => {
                            entered?;
                            break;
                        }
                        msg = transport.recv(), if !peer_closed => match msg {
                            Some(msg) => buffered.push_back(msg?),
                            None => peer_closed = true,
                        },
                        _ = cancel.cancelled() => return Ok(()),
                    }
                }
            }
            for msg in buffered {
                accept(&mut **state, msg)?;
            }
            if peer_closed {
                debug!("peer closed the conversation");
                return Ok(());
            }

            loop {
                let event = tokio::select! {
                    biased;
                    out = state.output(*seq_no) => Event::Output(out),
                    msg = transport.recv() => Event::Inbound(msg),
                    _ = cancel.cancelled() => Event::Cancelled,
                };

                match event {
                    Event::Output(Ok(Some(mut msg))) => {
                        msg.set_seq_no(*seq_no);
                        debug!("sending {} #{}", msg.alt_name(), seq_no);
                        transport.send(msg).await?;
                        *seq_no = seq_no.wrapping_add(1);
                    }
                    Event::Output(Ok(None)) => break,
                    Event::Output(Err(err)) => return Err(err),
                    Event::Inbound(Some(msg)) => accept(&mut **state, msg?)?,
                    Event::Inbound(None) => {
                        debug!("peer closed the conversation");
                        return Ok(());
                    }
                    Event::Cancelled => {
                        debug!("conversation cancelled");
                        return Ok(());
                    }
                }
            }

            let Some(current) = slot.take() else {
                break;
            };
            debug!("leaving state {}", current.name());
            *slot = current.leave();
        }

        Ok(())
    }

    async fn teardown(&mut self, err: &MishmashError) {
        self.outcome.fail(err.clone());

        if !matches!(err, MishmashError::Peer { .. } | MishmashError::Transport(_)) {
            let mut msg = O::from_error(ErrorMessage::from(err));
            msg.set_seq_no(self.seq_no);
            match self.transport.send(msg).await {
                Ok(()) => self.seq_no = self.seq_no.wrapping_add(1),
                Err(e) => warn!("failed to notify peer: {e}"),
            }
        }

        if let Some(state) = self.state.as_mut() {
            state.on_error(err);
        }
        self.close().await;
    }

    async fn close(&mut self) {
        if let Some(mut state) = self.state.take() {
            if let Err(e) = state.on_close() {
                warn!("failed to close state {}: {e}", state.name());
            }
        }
        if let Err(e) = self.transport.close().await {
            warn!("failed to close transport: {e}");
        }
    }
}

fn accept<I, O>(
    state: &mut dyn StreamState<I, O>,
    msg: I,
) -> Result<(), MishmashError>
where
    I: Message,
    O: Message,
{
    if let Some(err) = msg.as_error() {
        return Err(err.into());
    }
    if msg.is_unset() {
        return Err(MishmashError::Protocol("Message Type not set".to_string()));
    }
    debug!("received {} #{} in {}", msg.alt_name(), msg.seq_no(), state.name());
    state.validate_input(&msg)?;
    state.input(msg)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::ErrorCode,
        protocol::{
            message::{
                MutationClientMessage, MutationServerAlt, MutationServerMessage, YieldDataAck,
            },
            transport::channel_pair,
        },
    };

    struct Emit {
        remaining: VecDeque<Result<MutationClientMessage, MishmashError>>,
    }

    impl Emit {
        fn new(items: Vec<Result<MutationClientMessage, MishmashError>>) -> Self {
            Self {
                remaining: items.into(),
            }
        }
    }

    #[async_trait]
    impl StreamState<MutationServerMessage, MutationClientMessage> for Emit {
        fn name(&self) -> &'static str {
            "emit"
        }

        fn validate_input(&self, _input: &MutationServerMessage) -> Result<(), MishmashError> {
            Ok(())
        }

        fn input(&mut self, _input: MutationServerMessage) -> Result<(), MishmashError> {
            Ok(())
        }

        async fn output(
            &mut self,
            _seq_no: SeqNo,
        ) -> Result<Option<MutationClientMessage>, MishmashError> {
            self.remaining.pop_front().transpose()
        }

        fn leave(
            self: Box<Self>,
        ) -> Option<BoxedState<MutationServerMessage, MutationClientMessage>> {
            None
        }
    }

    fn blank() -> MutationClientMessage {
        MutationClientMessage {
            client_seq_no: 0,
            alt: None,
        }
    }

    #[tokio::test]
    async fn stamps_consecutive_sequence_numbers() {
        let (local, mut remote) = channel_pair::<MutationServerMessage, MutationClientMessage>(8);
        let config = ConversationConfig::default().with_initial_seq_no(5);
        let state = Emit::new(vec![Ok(blank()), Ok(blank()), Ok(blank())]);

        StreamDriver::new(local, Box::new(state), &config)
            .run()
            .await
            .unwrap();

        let mut seen = vec![];
        while let Some(msg) = remote.recv().await {
            seen.push(msg.unwrap().seq_no());
        }
        assert_eq!(seen, vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn local_error_notifies_peer() {
        let (local, mut remote) = channel_pair::<MutationServerMessage, MutationClientMessage>(8);
        let state = Emit::new(vec![
            Ok(blank()),
            Err(MishmashError::InvalidArgument("bad".to_string())),
        ]);
        let driver = StreamDriver::new(local, Box::new(state), &ConversationConfig::default());
        let outcome = driver.outcome();

        let err = driver.run().await.unwrap_err();
        assert_eq!(err, MishmashError::InvalidArgument("bad".to_string()));
        assert_eq!(outcome.error(), err);

        let first = remote.recv().await.unwrap().unwrap();
        assert_eq!(first.seq_no(), 0);
        let error = remote.recv().await.unwrap().unwrap();
        assert_eq!(error.seq_no(), 1);
        assert_eq!(
            error.as_error().map(|e| e.error_code),
            Some(ErrorCode::InvalidArgument.as_u32())
        );
        assert!(remote.recv().await.is_none());
    }

    /// Never finishes on its own.
    struct Wait;

    #[async_trait]
    impl StreamState<MutationServerMessage, MutationClientMessage> for Wait {
        fn name(&self) -> &'static str {
            "wait"
        }

        fn validate_input(&self, _input: &MutationServerMessage) -> Result<(), MishmashError> {
            Ok(())
        }

        fn input(&mut self, _input: MutationServerMessage) -> Result<(), MishmashError> {
            Ok(())
        }

        async fn output(
            &mut self,
            _seq_no: SeqNo,
        ) -> Result<Option<MutationClientMessage>, MishmashError> {
            std::future::pending().await
        }

        fn leave(
            self: Box<Self>,
        ) -> Option<BoxedState<MutationServerMessage, MutationClientMessage>> {
            None
        }
    }

    #[tokio::test]
    async fn peer_error_is_not_echoed() {
        let (local, mut remote) = channel_pair::<MutationServerMessage, MutationClientMessage>(8);

        let mut err = MutationServerMessage::from_error(ErrorMessage {
            error_code: 20,
            message: "boom".to_string(),
            additional_info: vec![],
        });
        err.set_seq_no(3);
        remote.send(err).await.unwrap();

        let result = StreamDriver::new(local, Box::new(Wait), &ConversationConfig::default())
            .run()
            .await;
        assert!(matches!(result, Err(MishmashError::Peer { code: 20, .. })));
        assert!(remote.recv().await.is_none());
    }

    #[tokio::test]
    async fn unset_message_is_a_protocol_error() {
        let (local, mut remote) = channel_pair::<MutationServerMessage, MutationClientMessage>(8);
        remote
            .send(MutationServerMessage {
                server_seq_no: 0,
                alt: None,
            })
            .await
            .unwrap();

        let err = StreamDriver::new(local, Box::new(Wait), &ConversationConfig::default())
            .run()
            .await
            .unwrap_err();
        assert_eq!(err, MishmashError::Protocol("Message Type not set".to_string()));

        let notification = remote.recv().await.unwrap().unwrap();
        assert_eq!(
            notification.as_error().map(|e| e.error_code),
            Some(ErrorCode::Protocol.as_u32())
        );
    }

    #[tokio::test]
    async fn peer_close_ends_cleanly() {
        let (local, mut remote) = channel_pair::<MutationServerMessage, MutationClientMessage>(8);
        remote
            .send(MutationServerMessage {
                server_seq_no: 0,
                alt: Some(MutationServerAlt::Ack(YieldDataAck { ack_seq_no: 0 })),
            })
            .await
            .unwrap();
        remote.close().await.unwrap();

        let driver = StreamDriver::new(local, Box::new(Wait), &ConversationConfig::default());
        let outcome = driver.outcome();
        driver.run().await.unwrap();
        assert!(outcome.failure().is_none());
    }

    #[tokio::test]
    async fn cancellation_ends_cleanly() {
        let (local, mut remote) = channel_pair::<MutationServerMessage, MutationClientMessage>(8);
        let token = CancellationToken::new();
        let driver = StreamDriver::new(local, Box::new(Wait), &ConversationConfig::default())
            .with_cancellation(token.clone());

        let handle = tokio::spawn(driver.run());
        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(remote.recv().await.is_none());
    }

    #[test]
    fn first_failure_wins() {
        let outcome = Outcome::new();
        assert_eq!(
            outcome.error(),
            MishmashError::Protocol("conversation closed".to_string())
        );
        assert!(outcome.fail(MishmashError::Timeout("a".to_string())));
        assert!(!outcome.fail(MishmashError::Internal("b".to_string())));
        assert!(outcome.error().is_timeout());
    }
}
