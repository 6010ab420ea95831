use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConversationConfig,
    data::{DataPoint, Setup},
    error::MishmashError,
    store::{Cursor, Store},
};

use super::{
    decode::decode_data_point,
    driver::StreamDriver,
    message::{
        Message, MutationClientAlt, MutationClientMessage, MutationServerAlt,
        MutationServerMessage, SeqNo, StreamClientAlt, StreamClientMessage, StreamServerAlt,
        StreamServerMessage, YieldData, YieldDataAck,
    },
    state::{BoxedState, StreamState, WaitSetup},
    transport::{ConversationKind, Duplex, FramedTransport, Preamble, TransportError},
};

/// Accepts conversations over TCP and serves them from a [`Store`].
pub struct Server {
    listener: TcpListener,
    store: Arc<dyn Store>,
    config: ConversationConfig,
}

impl Server {
    pub async fn bind(
        address: SocketAddr,
        store: Arc<dyn Store>,
        config: ConversationConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            store,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until `cancel` fires. Conversations still running
    /// at that point are cancelled too.
    pub async fn listen(self, cancel: CancellationToken) -> Result<(), TransportError> {
        info!("listening at {}", self.local_addr()?);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = cancel.cancelled() => {
                    info!("shutting down");
                    return Ok(());
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {peer}");
                    let store = Arc::clone(&self.store);
                    let config = self.config.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, store, config, cancel).await {
                            warn!("conversation with {peer} failed: {e}");
                        }
                    });
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    store: Arc<dyn Store>,
    config: ConversationConfig,
    cancel: CancellationToken,
) -> Result<(), MishmashError> {
    let preamble = Preamble::read_from(&mut stream).await?;
    info!("starting {:?} conversation", preamble.conversation);

    match preamble.conversation {
        ConversationKind::Stream => {
            let transport: FramedTransport<StreamClientMessage, StreamServerMessage> =
                FramedTransport::new(stream);
            serve(transport, stream_conversation(store, &config), config, cancel).await
        }
        ConversationKind::Mutation => {
            let transport: FramedTransport<MutationClientMessage, MutationServerMessage> =
                FramedTransport::new(stream);
            serve(transport, mutation_conversation(store, &config), config, cancel).await
        }
    }
}

async fn serve<I, O, T>(
    transport: T,
    initial: BoxedState<I, O>,
    config: ConversationConfig,
    cancel: CancellationToken,
) -> Result<(), MishmashError>
where
    I: Message,
    O: Message,
    T: Duplex<I, O>,
{
    StreamDriver::new(transport, initial, &config)
        .with_cancellation(cancel)
        .run()
        .await
}

/// Handshake followed by streaming the target set to the client.
pub fn stream_conversation(
    store: Arc<dyn Store>,
    config: &ConversationConfig,
) -> BoxedState<StreamClientMessage, StreamServerMessage> {
    Box::new(WaitSetup::new(
        config.setup_timeout,
        Box::new(move |setup: Setup| -> BoxedState<_, _> {
            Box::new(ServeStream::new(setup, store))
        }),
    ))
}

/// Handshake followed by applying every point the client yields.
pub fn mutation_conversation(
    store: Arc<dyn Store>,
    config: &ConversationConfig,
) -> BoxedState<MutationClientMessage, MutationServerMessage> {
    Box::new(WaitSetup::new(
        config.setup_timeout,
        Box::new(move |setup: Setup| -> BoxedState<_, _> {
            Box::new(AcceptMutation::new(setup, store))
        }),
    ))
}

/// Yields one point at a time, each acknowledged before the next is sent.
pub struct ServeStream {
    setup: Setup,
    store: Arc<dyn Store>,
    cursor: Option<Box<dyn Cursor>>,
    awaiting_ack: Option<SeqNo>,
}

impl ServeStream {
    pub fn new(setup: Setup, store: Arc<dyn Store>) -> Self {
        Self {
            setup,
            store,
            cursor: None,
            awaiting_ack: None,
        }
    }
}

#[async_trait]
impl StreamState<StreamClientMessage, StreamServerMessage> for ServeStream {
    fn name(&self) -> &'static str {
        "serve-stream"
    }

    async fn enter(&mut self) -> Result<(), MishmashError> {
        self.cursor = Some(self.store.open(&self.setup).await?);
        Ok(())
    }

    fn validate_input(&self, input: &StreamClientMessage) -> Result<(), MishmashError> {
        match &input.alt {
            Some(StreamClientAlt::Ack(ack)) => match self.awaiting_ack {
                Some(seq_no) if seq_no == ack.ack_seq_no => Ok(()),
                Some(seq_no) => Err(MishmashError::Protocol(format!(
                    "YIELD_DATA_ACK for #{} while waiting for #{seq_no}",
                    ack.ack_seq_no
                ))),
                None => Err(MishmashError::Protocol(
                    "unexpected YIELD_DATA_ACK".to_string(),
                )),
            },
            Some(StreamClientAlt::OutputAck(_)) | Some(StreamClientAlt::DebugAck(_)) => Ok(()),
            Some(StreamClientAlt::InvokeResult(_)) => Err(MishmashError::Unimplemented(
                "client invocations are not supported".to_string(),
            )),
            _ => Err(MishmashError::Protocol(format!(
                "unexpected {} while streaming",
                input.alt_name()
            ))),
        }
    }

    fn input(&mut self, input: StreamClientMessage) -> Result<(), MishmashError> {
        if let Some(StreamClientAlt::Ack(_)) = input.alt {
            self.awaiting_ack = None;
        }
        Ok(())
    }

    async fn output(&mut self, seq_no: SeqNo) -> Result<Option<StreamServerMessage>, MishmashError> {
        if self.awaiting_ack.is_some() {
            return std::future::pending().await;
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(MishmashError::InvalidState("cursor not opened".to_string()));
        };

        match cursor.next().await? {
            Some(point) => {
                let data = YieldData::try_from(&point)?;
                self.awaiting_ack = Some(seq_no);
                Ok(Some(StreamServerMessage {
                    server_seq_no: seq_no,
                    alt: Some(StreamServerAlt::YieldData(data)),
                }))
            }
            None => Ok(None),
        }
    }

    fn leave(self: Box<Self>) -> Option<BoxedState<StreamClientMessage, StreamServerMessage>> {
        None
    }
}

/// Applies yielded points to the store and acknowledges each one.
pub struct AcceptMutation {
    setup: Setup,
    store: Arc<dyn Store>,
    pending: Option<(SeqNo, DataPoint)>,
}

impl AcceptMutation {
    pub fn new(setup: Setup, store: Arc<dyn Store>) -> Self {
        Self {
            setup,
            store,
            pending: None,
        }
    }
}

#[async_trait]
impl StreamState<MutationClientMessage, MutationServerMessage> for AcceptMutation {
    fn name(&self) -> &'static str {
        "accept-mutation"
    }

    fn validate_input(&self, input: &MutationClientMessage) -> Result<(), MishmashError> {
        match (&input.alt, &self.pending) {
            (Some(MutationClientAlt::YieldData(_)), None) => Ok(()),
            (Some(MutationClientAlt::YieldData(_)), Some((seq_no, _))) => {
                Err(MishmashError::Protocol(format!(
                    "YIELD_DATA received before #{seq_no} was acknowledged"
                )))
            }
            _ => Err(MishmashError::Protocol(format!(
                "unexpected {} while accepting mutations",
                input.alt_name()
            ))),
        }
    }

    fn input(&mut self, input: MutationClientMessage) -> Result<(), MishmashError> {
        let seq_no = input.seq_no();
        if let Some(MutationClientAlt::YieldData(data)) = &input.alt {
            self.pending = Some((seq_no, decode_data_point(data)?));
        }
        Ok(())
    }

    async fn output(
        &mut self,
        _seq_no: SeqNo,
    ) -> Result<Option<MutationServerMessage>, MishmashError> {
        let Some((ack_seq_no, point)) = self.pending.as_ref() else {
            return std::future::pending().await;
        };
        let ack_seq_no = *ack_seq_no;

        self.store.write(&self.setup, point.clone()).await?;
        debug!("applied point #{ack_seq_no}");
        self.pending = None;

        Ok(Some(MutationServerMessage {
            server_seq_no: 0,
            alt: Some(MutationServerAlt::Ack(YieldDataAck { ack_seq_no })),
        }))
    }

    fn leave(self: Box<Self>) -> Option<BoxedState<MutationClientMessage, MutationServerMessage>> {
        None
    }
}
