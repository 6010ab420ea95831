//! Conversation tuning knobs.
use std::time::Duration;

use crate::protocol::message::SeqNo;

/// How long a client waits for the server to acknowledge its setup.
pub const SETUP_ACK_WAIT: Duration = Duration::from_millis(1500);

/// How long a server waits for the client's setup.
pub const SETUP_WAIT: Duration = Duration::from_millis(1500);

/// Default buffer size of the channels between a conversation and its owner.
pub const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    pub setup_ack_timeout: Duration,
    pub setup_timeout: Duration,
    /// First sequence number stamped on outbound messages.
    pub initial_seq_no: SeqNo,
    pub channel_capacity: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            setup_ack_timeout: SETUP_ACK_WAIT,
            setup_timeout: SETUP_WAIT,
            initial_seq_no: 0,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl ConversationConfig {
    pub fn with_setup_ack_timeout(mut self, timeout: Duration) -> Self {
        self.setup_ack_timeout = timeout;
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    pub fn with_initial_seq_no(mut self, seq_no: SeqNo) -> Self {
        self.initial_seq_no = seq_no;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
