use std::{io, marker::PhantomData, net::SocketAddr};

use async_trait::async_trait;
use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::trace;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::error::MishmashError;

pub const PROTOCOL_VERSION: u16 = 1;

/// Largest frame payload accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("frame too large (max {max} bytes)")]
    FrameTooLarge { max: usize },
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),
    #[error("unknown conversation kind: {0}")]
    UnknownConversation(u16),
}

impl From<TransportError> for MishmashError {
    fn from(value: TransportError) -> Self {
        MishmashError::Transport(value.to_string())
    }
}

/// Which of the two conversations a connection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Stream = 1,
    Mutation = 2,
}

impl ConversationKind {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Stream),
            2 => Some(Self::Mutation),
            _ => None,
        }
    }
}

/// Written once by the client right after connecting.
///
/// Layout (big-endian): `version: u16`, `conversation: u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub version: u16,
    pub conversation: ConversationKind,
}

impl Preamble {
    pub const SIZE: usize = 4;

    pub fn new(conversation: ConversationKind) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            conversation,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.conversation.as_u16().to_be_bytes());
        buf
    }

    pub fn decode(buf: [u8; Self::SIZE]) -> Result<Self, TransportError> {
        let version = u16::from_be_bytes([buf[0], buf[1]]);
        if version != PROTOCOL_VERSION {
            return Err(TransportError::UnsupportedVersion(version));
        }
        let raw = u16::from_be_bytes([buf[2], buf[3]]);
        let conversation =
            ConversationKind::from_u16(raw).ok_or(TransportError::UnknownConversation(raw))?;
        Ok(Self {
            version,
            conversation,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), TransportError> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, TransportError> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf).await?;
        Self::decode(buf)
    }
}

/// Bidirectional message channel a conversation runs over.
#[async_trait]
pub trait Duplex<I, O>: Send
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn send(&mut self, message: O) -> Result<(), MishmashError>;

    /// Next inbound message, `None` once the peer has finished.
    ///
    /// Must be cancel-safe: the driver drops pending calls freely.
    async fn recv(&mut self) -> Option<Result<I, MishmashError>>;

    /// Finishes the outbound direction.
    async fn close(&mut self) -> Result<(), MishmashError>;
}

/// In-process transport backed by two bounded channels.
pub struct ChannelTransport<I, O> {
    tx: Option<mpsc::Sender<O>>,
    rx: mpsc::Receiver<I>,
}

/// Creates two connected ends. The first receives `A` and sends `B`.
pub fn channel_pair<A, B>(capacity: usize) -> (ChannelTransport<A, B>, ChannelTransport<B, A>) {
    let (a_tx, a_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, b_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelTransport {
            tx: Some(b_tx),
            rx: a_rx,
        },
        ChannelTransport {
            tx: Some(a_tx),
            rx: b_rx,
        },
    )
}

#[async_trait]
impl<I, O> Duplex<I, O> for ChannelTransport<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn send(&mut self, message: O) -> Result<(), MishmashError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| MishmashError::Transport("outbound side already closed".to_string()))?;
        tx.send(message)
            .await
            .map_err(|_| MishmashError::Transport("peer hung up".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<I, MishmashError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), MishmashError> {
        self.tx = None;
        Ok(())
    }
}

/// Length-prefixed bincode frames over any byte stream.
///
/// Each frame is a `u32` big-endian payload length followed by the payload,
/// and neither direction accepts a payload over [`MAX_FRAME_SIZE`].
pub struct FramedTransport<I, O, S = TcpStream> {
    frames: Framed<S, LengthDelimitedCodec>,
    config: Configuration<BigEndian, Fixint>,
    _messages: PhantomData<fn(O) -> I>,
}

fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_SIZE)
        .new_codec()
}

impl<I, O, S> FramedTransport<I, O, S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        Self {
            frames: Framed::new(stream, frame_codec()),
            config: wire_config(),
            _messages: PhantomData,
        }
    }
}

impl<I, O> FramedTransport<I, O, TcpStream> {
    /// Connects to a server and announces the conversation kind.
    pub async fn connect(
        address: SocketAddr,
        conversation: ConversationKind,
    ) -> Result<Self, MishmashError> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(TransportError::from)?;
        Preamble::new(conversation).write_to(&mut stream).await?;
        Ok(Self::new(stream))
    }
}

fn read_error(error: io::Error) -> TransportError {
    let too_large = error
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if too_large {
        TransportError::FrameTooLarge {
            max: MAX_FRAME_SIZE,
        }
    } else {
        error.into()
    }
}

#[async_trait]
impl<I, O, S> Duplex<I, O> for FramedTransport<I, O, S>
where
    I: Decode<()> + Send + 'static,
    O: Encode + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: O) -> Result<(), MishmashError> {
        let payload = encode_to_vec(&message, self.config).map_err(TransportError::from)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                max: MAX_FRAME_SIZE,
            }
            .into());
        }

        self.frames
            .send(Bytes::from(payload))
            .await
            .map_err(|e| TransportError::from(e).into())
    }

    async fn recv(&mut self) -> Option<Result<I, MishmashError>> {
        let frame = match self.frames.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Some(Err(read_error(e).into())),
            None => {
                trace!("inbound stream finished");
                return None;
            }
        };

        let message = decode_from_slice::<I, _>(&frame, self.config)
            .map(|(message, _)| message)
            .map_err(|e| TransportError::from(e).into());
        Some(message)
    }

    async fn close(&mut self) -> Result<(), MishmashError> {
        <Framed<S, LengthDelimitedCodec> as SinkExt<Bytes>>::close(&mut self.frames)
            .await
            .map_err(|e: io::Error| TransportError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{DuplexStream, duplex};

    use super::*;
    use crate::protocol::message::{
        MutationClientAlt, MutationClientMessage, MutationServerMessage, ServerMessage,
        YieldData,
    };

    type ClientSide = FramedTransport<MutationServerMessage, MutationClientMessage, DuplexStream>;
    type ServerSide = FramedTransport<MutationClientMessage, MutationServerMessage, DuplexStream>;

    #[tokio::test]
    async fn read_write_messages() {
        let (a, b) = duplex(1024);
        let mut client = ClientSide::new(a);
        let mut server = ServerSide::new(b);

        let message = MutationClientMessage {
            client_seq_no: 3,
            alt: Some(MutationClientAlt::YieldData(YieldData {
                hierarchy: vec![],
                value: None,
            })),
        };
        client.send(message.clone()).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), message);

        server
            .send(MutationServerMessage::setup_ack(3))
            .await
            .unwrap();
        let ack = client.recv().await.unwrap().unwrap();
        assert!(ack.is_setup_ack());
    }

    #[tokio::test]
    async fn close_finishes_peer_stream() {
        let (a, b) = duplex(1024);
        let mut client = ClientSide::new(a);
        let mut server = ServerSide::new(b);

        client.close().await.unwrap();
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn garbage_frame_is_a_transport_error() {
        let (mut a, b) = duplex(1024);
        let mut server = ServerSide::new(b);

        a.write_all(&2u32.to_be_bytes()).await.unwrap();
        a.write_all(&[0xff, 0xff]).await.unwrap();

        let err = server.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, MishmashError::Transport(_)));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, b) = duplex(1024);
        let mut server = ServerSide::new(b);

        a.write_all(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes())
            .await
            .unwrap();

        let err = server.recv().await.unwrap().unwrap_err();
        assert_eq!(
            err,
            MishmashError::from(TransportError::FrameTooLarge {
                max: MAX_FRAME_SIZE
            })
        );
    }

    #[tokio::test]
    async fn frames_carry_a_big_endian_length() {
        let (a, mut b) = duplex(1024);
        let mut server = ServerSide::new(a);

        let ack = MutationServerMessage::setup_ack(9);
        let payload = encode_to_vec(&ack, wire_config()).unwrap();
        server.send(ack).await.unwrap();
        server.close().await.unwrap();

        let mut raw = Vec::new();
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw[..4], (payload.len() as u32).to_be_bytes());
        assert_eq!(raw[4..], payload[..]);
    }

    #[tokio::test]
    async fn channel_pair_close() {
        let (mut left, mut right) = channel_pair::<u8, u16>(1);
        left.send(7u16).await.unwrap();
        assert_eq!(right.recv().await.unwrap().unwrap(), 7u16);

        right.close().await.unwrap();
        assert!(left.recv().await.is_none());
        assert!(right.send(1u8).await.is_err());
    }

    #[tokio::test]
    async fn preamble_roundtrip() {
        let (mut a, mut b) = duplex(64);
        Preamble::new(ConversationKind::Mutation)
            .write_to(&mut a)
            .await
            .unwrap();

        let preamble = Preamble::read_from(&mut b).await.unwrap();
        assert_eq!(preamble.conversation, ConversationKind::Mutation);
        assert_eq!(preamble.version, PROTOCOL_VERSION);
    }

    #[test]
    fn preamble_rejects_unknown_values() {
        assert!(matches!(
            Preamble::decode([0, 9, 0, 1]),
            Err(TransportError::UnsupportedVersion(9))
        ));
        assert!(matches!(
            Preamble::decode([0, 1, 0, 7]),
            Err(TransportError::UnknownConversation(7))
        ));
    }
}
