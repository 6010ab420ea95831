//! Wire messages.
//!
//! Every message is a plain bincode-encoded struct. Optional fields are
//! `Option`s so that "unset" survives the trip and can be reported as a
//! protocol error on the receiving side.
use std::collections::BTreeMap;

use bincode::{Decode, Encode};

pub use crate::data::MutationType;

/// Per-direction sequence number.
pub type SeqNo = u32;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Id {
    pub id: String,
}

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct BigEndianDecimal {
    pub negative: bool,
    pub integer_part: Vec<u8>,
    pub fractional_part: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum DecimalKind {
    SInt32(i32),
    UInt32(u32),
    SInt64(i64),
    UInt64(u64),
    Floating(f64),
    StringSequence(String),
    BigDecimal(BigEndianDecimal),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct DecimalValue {
    pub kind: Option<DecimalKind>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Decimal(DecimalValue),
    String(String),
    /// ISO-8601 date-time with offset.
    Date(String),
    Buffer(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Value {
    pub kind: Option<ValueKind>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum LiteralKind {
    Id(Id),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Literal {
    pub kind: Option<LiteralKind>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SetDescriptorList {
    pub descriptors: Vec<SetDescriptor>,
}

impl From<Vec<SetDescriptor>> for SetDescriptorList {
    fn from(descriptors: Vec<SetDescriptor>) -> Self {
        Self { descriptors }
    }
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Union {
    pub sets: Option<SetDescriptorList>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Intersection {
    pub sets: Option<SetDescriptorList>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Axis {
    pub left: Option<SetDescriptorList>,
    pub right: Option<SetDescriptorList>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Transformation {
    pub axis: Option<Axis>,
}

/// Raw identifier, see [`PredefinedSetKind::ident`](crate::data::PredefinedSetKind::ident).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PredefinedSet {
    pub ident: u8,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct PredefinedFunction {
    pub name: String,
    pub arguments: Vec<SetDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LambdaFunctionBody {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LambdaFunction {
    pub client_runtime: String,
    pub name: Option<String>,
    pub scope_id: String,
    pub body: Option<LambdaFunctionBody>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum DescriptorKind {
    Literal(Literal),
    PredefinedSet(PredefinedSet),
    Union(Union),
    Intersection(Intersection),
    Transformation(Transformation),
    PredefinedFunction(PredefinedFunction),
    LambdaFunction(LambdaFunction),
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SetDescriptor {
    pub kind: Option<DescriptorKind>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Setup {
    pub target_set: Option<SetDescriptorList>,
    pub client_options: BTreeMap<String, String>,
    pub mutation_type: Option<MutationType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SetupAck {
    pub ack_seq_no: SeqNo,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum MemberKind {
    Name(String),
    Index(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct YieldMember {
    pub instance_id: Option<Id>,
    pub member: Option<MemberKind>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct YieldValue {
    pub instance_id: Option<Id>,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct YieldData {
    pub hierarchy: Vec<YieldMember>,
    pub value: Option<YieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct YieldDataAck {
    pub ack_seq_no: SeqNo,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ErrorMessage {
    pub error_code: u32,
    pub message: String,
    pub additional_info: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DebugInfo {
    pub info: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DebugAck {
    pub ack_seq_no: SeqNo,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ConsoleOutput {
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ConsoleOutputAck {
    pub ack_seq_no: SeqNo,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ClientInvokeRequest {
    pub callable_id: String,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ClientInvokeResult {
    pub ack_seq_no: SeqNo,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum StreamClientAlt {
    Setup(Setup),
    Ack(YieldDataAck),
    Error(ErrorMessage),
    InvokeResult(ClientInvokeResult),
    OutputAck(ConsoleOutputAck),
    DebugAck(DebugAck),
}

/// Client to server, stream conversation.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StreamClientMessage {
    pub client_seq_no: SeqNo,
    pub alt: Option<StreamClientAlt>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum StreamServerAlt {
    SetupAck(SetupAck),
    YieldData(YieldData),
    Error(ErrorMessage),
    Invoke(ClientInvokeRequest),
    Output(ConsoleOutput),
    Debug(DebugInfo),
}

/// Server to client, stream conversation.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct StreamServerMessage {
    pub server_seq_no: SeqNo,
    pub alt: Option<StreamServerAlt>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum MutationClientAlt {
    Setup(Setup),
    YieldData(YieldData),
    Error(ErrorMessage),
}

/// Client to server, mutation conversation.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct MutationClientMessage {
    pub client_seq_no: SeqNo,
    pub alt: Option<MutationClientAlt>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum MutationServerAlt {
    SetupAck(SetupAck),
    Ack(YieldDataAck),
    Error(ErrorMessage),
}

/// Server to client, mutation conversation.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct MutationServerMessage {
    pub server_seq_no: SeqNo,
    pub alt: Option<MutationServerAlt>,
}

/// Envelope behaviour shared by all four message families.
pub trait Message: std::fmt::Debug + Send + 'static {
    fn seq_no(&self) -> SeqNo;

    fn set_seq_no(&mut self, seq_no: SeqNo);

    /// Wire name of the populated alternative, for logs and errors.
    fn alt_name(&self) -> &'static str;

    fn is_unset(&self) -> bool {
        self.alt_name() == UNSET
    }

    fn from_error(error: ErrorMessage) -> Self;

    fn as_error(&self) -> Option<&ErrorMessage>;
}

/// Messages a client sends.
pub trait ClientMessage: Message {
    fn from_setup(setup: Setup) -> Self;

    fn into_setup(self) -> Option<Setup>;

    fn is_setup(&self) -> bool;
}

/// Messages a server sends.
pub trait ServerMessage: Message {
    fn setup_ack(ack_seq_no: SeqNo) -> Self;

    fn as_setup_ack(&self) -> Option<&SetupAck>;

    fn is_setup_ack(&self) -> bool {
        self.as_setup_ack().is_some()
    }
}

const UNSET: &str = "UNSET";

impl Message for StreamClientMessage {
    fn seq_no(&self) -> SeqNo {
        self.client_seq_no
    }

    fn set_seq_no(&mut self, seq_no: SeqNo) {
        self.client_seq_no = seq_no;
    }

    fn alt_name(&self) -> &'static str {
        match &self.alt {
            Some(StreamClientAlt::Setup(_)) => "SETUP",
            Some(StreamClientAlt::Ack(_)) => "ACK",
            Some(StreamClientAlt::Error(_)) => "ERROR",
            Some(StreamClientAlt::InvokeResult(_)) => "INVOKE_RESULT",
            Some(StreamClientAlt::OutputAck(_)) => "OUTPUT_ACK",
            Some(StreamClientAlt::DebugAck(_)) => "DEBUG_ACK",
            None => UNSET,
        }
    }

    fn from_error(error: ErrorMessage) -> Self {
        Self {
            client_seq_no: 0,
            alt: Some(StreamClientAlt::Error(error)),
        }
    }

    fn as_error(&self) -> Option<&ErrorMessage> {
        match &self.alt {
            Some(StreamClientAlt::Error(e)) => Some(e),
            _ => None,
        }
    }
}

impl ClientMessage for StreamClientMessage {
    fn from_setup(setup: Setup) -> Self {
        Self {
            client_seq_no: 0,
            alt: Some(StreamClientAlt::Setup(setup)),
        }
    }

    fn into_setup(self) -> Option<Setup> {
        match self.alt {
            Some(StreamClientAlt::Setup(setup)) => Some(setup),
            _ => None,
        }
    }

    fn is_setup(&self) -> bool {
        matches!(self.alt, Some(StreamClientAlt::Setup(_)))
    }
}

impl Message for StreamServerMessage {
    fn seq_no(&self) -> SeqNo {
        self.server_seq_no
    }

    fn set_seq_no(&mut self, seq_no: SeqNo) {
        self.server_seq_no = seq_no;
    }

    fn alt_name(&self) -> &'static str {
        match &self.alt {
            Some(StreamServerAlt::SetupAck(_)) => "SETUP_ACK",
            Some(StreamServerAlt::YieldData(_)) => "YIELD_DATA",
            Some(StreamServerAlt::Error(_)) => "ERROR",
            Some(StreamServerAlt::Invoke(_)) => "INVOKE",
            Some(StreamServerAlt::Output(_)) => "OUTPUT",
            Some(StreamServerAlt::Debug(_)) => "DEBUG",
            None => UNSET,
        }
    }

    fn from_error(error: ErrorMessage) -> Self {
        Self {
            server_seq_no: 0,
            alt: Some(StreamServerAlt::Error(error)),
        }
    }

    fn as_error(&self) -> Option<&ErrorMessage> {
        match &self.alt {
            Some(StreamServerAlt::Error(e)) => Some(e),
            _ => None,
        }
    }
}

impl ServerMessage for StreamServerMessage {
    fn setup_ack(ack_seq_no: SeqNo) -> Self {
        Self {
            server_seq_no: 0,
            alt: Some(StreamServerAlt::SetupAck(SetupAck { ack_seq_no })),
        }
    }

    fn as_setup_ack(&self) -> Option<&SetupAck> {
        match &self.alt {
            Some(StreamServerAlt::SetupAck(ack)) => Some(ack),
            _ => None,
        }
    }
}

impl Message for MutationClientMessage {
    fn seq_no(&self) -> SeqNo {
        self.client_seq_no
    }

    fn set_seq_no(&mut self, seq_no: SeqNo) {
        self.client_seq_no = seq_no;
    }

    fn alt_name(&self) -> &'static str {
        match &self.alt {
            Some(MutationClientAlt::Setup(_)) => "SETUP",
            Some(MutationClientAlt::YieldData(_)) => "YIELD_DATA",
            Some(MutationClientAlt::Error(_)) => "ERROR",
            None => UNSET,
        }
    }

    fn from_error(error: ErrorMessage) -> Self {
        Self {
            client_seq_no: 0,
            alt: Some(MutationClientAlt::Error(error)),
        }
    }

    fn as_error(&self) -> Option<&ErrorMessage> {
        match &self.alt {
            Some(MutationClientAlt::Error(e)) => Some(e),
            _ => None,
        }
    }
}

impl ClientMessage for MutationClientMessage {
    fn from_setup(setup: Setup) -> Self {
        Self {
            client_seq_no: 0,
            alt: Some(MutationClientAlt::Setup(setup)),
        }
    }

    fn into_setup(self) -> Option<Setup> {
        match self.alt {
            Some(MutationClientAlt::Setup(setup)) => Some(setup),
            _ => None,
        }
    }

    fn is_setup(&self) -> bool {
        matches!(self.alt, Some(MutationClientAlt::Setup(_)))
    }
}

impl Message for MutationServerMessage {
    fn seq_no(&self) -> SeqNo {
        self.server_seq_no
    }

    fn set_seq_no(&mut self, seq_no: SeqNo) {
        self.server_seq_no = seq_no;
    }

    fn alt_name(&self) -> &'static str {
        match &self.alt {
            Some(MutationServerAlt::SetupAck(_)) => "SETUP_ACK",
            Some(MutationServerAlt::Ack(_)) => "ACK",
            Some(MutationServerAlt::Error(_)) => "ERROR",
            None => UNSET,
        }
    }

    fn from_error(error: ErrorMessage) -> Self {
        Self {
            server_seq_no: 0,
            alt: Some(MutationServerAlt::Error(error)),
        }
    }

    fn as_error(&self) -> Option<&ErrorMessage> {
        match &self.alt {
            Some(MutationServerAlt::Error(e)) => Some(e),
            _ => None,
        }
    }
}

impl ServerMessage for MutationServerMessage {
    fn setup_ack(ack_seq_no: SeqNo) -> Self {
        Self {
            server_seq_no: 0,
            alt: Some(MutationServerAlt::SetupAck(SetupAck { ack_seq_no })),
        }
    }

    fn as_setup_ack(&self) -> Option<&SetupAck> {
        match &self.alt {
            Some(MutationServerAlt::SetupAck(ack)) => Some(ack),
            _ => None,
        }
    }
}
