use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::{mpsc, oneshot};

use crate::{
    config::ConversationConfig,
    data::{DataPoint, Setup},
    error::MishmashError,
    protocol::{
        BoxedState, ClientMessage, ConversationKind, Duplex, FramedTransport, Message, Outcome,
        SendSetup, StreamDriver, StreamState,
        message::{
            self, MutationClientAlt, MutationClientMessage, MutationServerAlt,
            MutationServerMessage, SeqNo, YieldData,
        },
    },
};

use super::{DriverHandle, finish, opened};

type Ack = oneshot::Sender<Result<(), MishmashError>>;

struct PendingYield {
    data: YieldData,
    ack: Ack,
}

/// Writes data points to a server, one acknowledged point at a time.
pub struct MutationClient {
    yields: mpsc::Sender<PendingYield>,
    in_flight: AtomicBool,
    outcome: Outcome,
    driver: DriverHandle,
}

impl MutationClient {
    pub async fn connect(
        address: SocketAddr,
        setup: Setup,
        config: &ConversationConfig,
    ) -> Result<Self, MishmashError> {
        let transport = FramedTransport::connect(address, ConversationKind::Mutation).await?;
        Self::open(transport, setup, config).await
    }

    /// Performs the handshake over `transport`.
    ///
    /// The setup must name a mutation type.
    pub async fn open<T>(
        transport: T,
        setup: Setup,
        config: &ConversationConfig,
    ) -> Result<Self, MishmashError>
    where
        T: Duplex<MutationServerMessage, MutationClientMessage> + 'static,
    {
        if setup.mutation_type.is_none() {
            return Err(MishmashError::InvalidArgument(
                "a mutation conversation requires a mutation type".to_string(),
            ));
        }
        let wire = message::Setup::try_from(&setup)?;

        let (yields, rx) = mpsc::channel(config.channel_capacity.max(1));
        let (opened_tx, opened_rx) = oneshot::channel();
        let accept = AcceptYields {
            yields: rx,
            in_flight: None,
            opened: Some(opened_tx),
        };
        let state = SendSetup::new(
            MutationClientMessage::from_setup(wire),
            config.setup_ack_timeout,
            Box::new(accept),
        );

        let driver = StreamDriver::new(transport, Box::new(state), config);
        let outcome = driver.outcome();
        let driver = opened(opened_rx, tokio::spawn(driver.run()), &outcome).await?;

        Ok(Self {
            yields,
            in_flight: AtomicBool::new(false),
            outcome,
            driver,
        })
    }

    /// Sends one point and waits for the server to acknowledge it.
    ///
    /// Only one put may be in flight at a time.
    pub async fn put(&self, point: DataPoint) -> Result<(), MishmashError> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let data = YieldData::try_from(&point)?;

        let (ack, acked) = oneshot::channel();
        self.yields
            .send(PendingYield { data, ack })
            .await
            .map_err(|_| self.outcome.error())?;
        acked.await.map_err(|_| self.outcome.error())?
    }

    /// Ends the conversation once every sent point was acknowledged.
    pub async fn close(self) -> Result<(), MishmashError> {
        drop(self.yields);
        finish(self.driver).await
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, MishmashError> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(MishmashError::InvalidState(
                "another put is still in flight".to_string(),
            ));
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Data phase of a mutation conversation.
struct AcceptYields {
    yields: mpsc::Receiver<PendingYield>,
    in_flight: Option<(SeqNo, Ack)>,
    opened: Option<oneshot::Sender<()>>,
}

impl AcceptYields {
    fn fail_in_flight(&mut self, error: MishmashError) {
        if let Some((_, ack)) = self.in_flight.take() {
            let _ = ack.send(Err(error));
        }
    }
}

#[async_trait]
impl StreamState<MutationServerMessage, MutationClientMessage> for AcceptYields {
    fn name(&self) -> &'static str {
        "accept-yields"
    }

    async fn enter(&mut self) -> Result<(), MishmashError> {
        if let Some(opened) = self.opened.take() {
            let _ = opened.send(());
        }
        Ok(())
    }

    fn validate_input(&self, input: &MutationServerMessage) -> Result<(), MishmashError> {
        let Some(MutationServerAlt::Ack(ack)) = &input.alt else {
            return Err(MishmashError::Protocol(format!(
                "expected YIELD_DATA_ACK, received {}",
                input.alt_name()
            )));
        };
        match &self.in_flight {
            Some((seq_no, _)) if *seq_no == ack.ack_seq_no => Ok(()),
            Some((seq_no, _)) => Err(MishmashError::Protocol(format!(
                "YIELD_DATA_ACK for #{} while waiting for #{seq_no}",
                ack.ack_seq_no
            ))),
            None => Err(MishmashError::Protocol(
                "unexpected YIELD_DATA_ACK".to_string(),
            )),
        }
    }

    fn input(&mut self, _input: MutationServerMessage) -> Result<(), MishmashError> {
        if let Some((seq_no, ack)) = self.in_flight.take() {
            debug!("point #{seq_no} acknowledged");
            let _ = ack.send(Ok(()));
        }
        Ok(())
    }

    async fn output(
        &mut self,
        seq_no: SeqNo,
    ) -> Result<Option<MutationClientMessage>, MishmashError> {
        if self.in_flight.is_some() {
            return std::future::pending().await;
        }

        match self.yields.recv().await {
            Some(PendingYield { data, ack }) => {
                self.in_flight = Some((seq_no, ack));
                Ok(Some(MutationClientMessage {
                    client_seq_no: seq_no,
                    alt: Some(MutationClientAlt::YieldData(data)),
                }))
            }
            None => Ok(None),
        }
    }

    fn leave(
        self: Box<Self>,
    ) -> Option<BoxedState<MutationServerMessage, MutationClientMessage>> {
        None
    }

    fn on_error(&mut self, error: &MishmashError) {
        self.fail_in_flight(error.clone());
    }

    fn on_close(&mut self) -> Result<(), MishmashError> {
        self.fail_in_flight(MishmashError::Protocol("conversation closed".to_string()));
        Ok(())
    }
}
