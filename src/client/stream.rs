use std::{collections::VecDeque, net::SocketAddr};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConversationConfig,
    data::{DataPoint, Setup},
    error::MishmashError,
    protocol::{
        BoxedState, ClientMessage, ConversationKind, Duplex, FramedTransport, Message, Outcome,
        SendSetup, StreamDriver, StreamState,
        decode::decode_data_point,
        message::{
            self, ConsoleOutputAck, DebugAck, SeqNo, StreamClientAlt, StreamClientMessage,
            StreamServerAlt, StreamServerMessage, YieldDataAck,
        },
    },
};

use super::{DriverHandle, finish, opened};

/// Reads the data points of a set from a server.
pub struct StreamClient {
    points: mpsc::UnboundedReceiver<DataPoint>,
    outcome: Outcome,
    cancel: CancellationToken,
    driver: DriverHandle,
}

impl StreamClient {
    pub async fn connect(
        address: SocketAddr,
        setup: Setup,
        config: &ConversationConfig,
    ) -> Result<Self, MishmashError> {
        let transport = FramedTransport::connect(address, ConversationKind::Stream).await?;
        Self::open(transport, setup, config).await
    }

    pub async fn open<T>(
        transport: T,
        setup: Setup,
        config: &ConversationConfig,
    ) -> Result<Self, MishmashError>
    where
        T: Duplex<StreamServerMessage, StreamClientMessage> + 'static,
    {
        let wire = message::Setup::try_from(&setup)?;

        let (tx, points) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();
        let receive = ReceiveYields {
            points: tx,
            acks: VecDeque::new(),
            opened: Some(opened_tx),
        };
        let state = SendSetup::new(
            StreamClientMessage::from_setup(wire),
            config.setup_ack_timeout,
            Box::new(receive),
        );

        let cancel = CancellationToken::new();
        let driver =
            StreamDriver::new(transport, Box::new(state), config).with_cancellation(cancel.clone());
        let outcome = driver.outcome();
        let driver = opened(opened_rx, tokio::spawn(driver.run()), &outcome).await?;

        Ok(Self {
            points,
            outcome,
            cancel,
            driver,
        })
    }

    /// Next point of the set, `None` once the server finished the stream.
    pub async fn get(&mut self) -> Result<Option<DataPoint>, MishmashError> {
        match self.points.recv().await {
            Some(point) => Ok(Some(point)),
            None => match self.outcome.failure() {
                Some(err) => Err(err.clone()),
                None => Ok(None),
            },
        }
    }

    /// Stops reading, even if the server has more to send.
    pub async fn close(self) -> Result<(), MishmashError> {
        self.cancel.cancel();
        finish(self.driver).await
    }
}

/// Data phase of a stream conversation.
struct ReceiveYields {
    points: mpsc::UnboundedSender<DataPoint>,
    acks: VecDeque<StreamClientAlt>,
    opened: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl StreamState<StreamServerMessage, StreamClientMessage> for ReceiveYields {
    fn name(&self) -> &'static str {
        "receive-yields"
    }

    async fn enter(&mut self) -> Result<(), MishmashError> {
        if let Some(opened) = self.opened.take() {
            let _ = opened.send(());
        }
        Ok(())
    }

    fn validate_input(&self, input: &StreamServerMessage) -> Result<(), MishmashError> {
        match &input.alt {
            Some(StreamServerAlt::YieldData(_))
            | Some(StreamServerAlt::Debug(_))
            | Some(StreamServerAlt::Output(_)) => Ok(()),
            Some(StreamServerAlt::Invoke(_)) => Err(MishmashError::Unimplemented(
                "client invocations are not supported".to_string(),
            )),
            _ => Err(MishmashError::Protocol(format!(
                "unexpected {} while streaming",
                input.alt_name()
            ))),
        }
    }

    fn input(&mut self, input: StreamServerMessage) -> Result<(), MishmashError> {
        let ack_seq_no = input.seq_no();
        let ack = match input.alt {
            Some(StreamServerAlt::YieldData(data)) => {
                let point = decode_data_point(&data)?;
                if self.points.send(point).is_err() {
                    debug!("point #{ack_seq_no} dropped, nobody is reading");
                }
                StreamClientAlt::Ack(YieldDataAck { ack_seq_no })
            }
            Some(StreamServerAlt::Debug(debug)) => {
                for line in &debug.info {
                    debug!("server: {line}");
                }
                StreamClientAlt::DebugAck(DebugAck { ack_seq_no })
            }
            Some(StreamServerAlt::Output(output)) => {
                info!("{}", output.line);
                StreamClientAlt::OutputAck(ConsoleOutputAck { ack_seq_no })
            }
            _ => return Ok(()),
        };
        self.acks.push_back(ack);
        Ok(())
    }

    async fn output(&mut self, seq_no: SeqNo) -> Result<Option<StreamClientMessage>, MishmashError> {
        match self.acks.pop_front() {
            Some(ack) => Ok(Some(StreamClientMessage {
                client_seq_no: seq_no,
                alt: Some(ack),
            })),
            None => std::future::pending().await,
        }
    }

    fn leave(self: Box<Self>) -> Option<BoxedState<StreamServerMessage, StreamClientMessage>> {
        None
    }
}
