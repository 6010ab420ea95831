//! Client-server conversation protocol.
//!
//! This module defines how Mishmash clients and servers talk: the message
//! families exchanged in each kind of conversation, their binary framing, and
//! the state machine that drives a conversation from handshake to teardown.
//!
//! # Overview
//!
//! Every conversation starts with a handshake. The client sends a `SETUP`
//! message describing a target set; the server replays that description
//! through a fresh [`SetBuilder`](crate::builder::SetBuilder) and answers
//! with `SETUP_ACK`. After that the two sides exchange data:
//!
//! - in a stream conversation the server yields data points and the client
//!   acknowledges each one;
//! - in a mutation conversation the client yields data points and the server
//!   acknowledges each one after applying it.
//!
//! Any error ends the conversation. The side that detected it sends an
//! `ERROR` message to its peer, unless the error came from the peer itself.
//!
//! # Key Components
//!
//! - [`StreamState`]: one phase of a conversation.
//! - [`StreamDriver`]: runs a chain of states over a [`Duplex`] transport and
//!   stamps outbound sequence numbers.
//! - [`FramedTransport`]: length-prefixed bincode frames over TCP.
//! - [`Server`]: accepts conversations and serves them from a
//!   [`Store`](crate::store::Store).
//!
//! # Binary Format
//!
//! A connection opens with a 4 byte [`Preamble`] (protocol version, then
//! conversation kind). Every message after that is a frame:
//!
//! - a `u32` payload length;
//! - the bincode encoded envelope.
//!
//! All integers are big-endian and fixed width.
//!
//! # See Also
//!
//! - [`client`](crate::client): application-facing ends of both conversation kinds.
pub mod decode;
mod driver;
mod encode;
pub mod message;
mod server;
mod state;
mod transport;

pub use driver::{Outcome, StreamDriver};
pub use message::{ClientMessage, Message, SeqNo, ServerMessage};
pub use server::{AcceptMutation, ServeStream, Server, mutation_conversation, stream_conversation};
pub use state::{BoxedState, NextState, SendSetup, StreamState, WaitSetup, WaitSetupAck};
pub use transport::{
    ChannelTransport, ConversationKind, Duplex, FramedTransport, MAX_FRAME_SIZE, PROTOCOL_VERSION,
    Preamble, TransportError, channel_pair,
};
