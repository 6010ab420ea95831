//! Data model shared by the builder, the codec and the conversations.
//!
//! # Overview
//!
//! A conversation moves two kinds of things between peers: a set expression
//! (a tree of [`Descriptor`]s describing which part of the graph is targeted)
//! and a stream of [`DataPoint`]s (a key path plus a [`Value`]).
//!
//! All types in this module are immutable once constructed. Instance ids are
//! opaque strings: they are carried through untouched and never interpreted.
//!
//! # Key Components
//!
//! - [`Instance`]: opaque identifier of a node in the graph.
//! - [`Key`]: one step of a key path, either a member name or an index.
//! - [`Value`]: a literal value, optionally bound to an instance.
//! - [`Decimal`]: numeric value in one of the wire-level encodings.
//! - [`Descriptor`]: one node of a set expression.
//! - [`Setup`]: the target expression plus the conversation options.
pub mod decimal;
pub mod descriptor;
pub mod key;
pub mod value;

use std::fmt;

pub use decimal::Decimal;
pub use descriptor::{Descriptor, LambdaFunction, Literal, MutationType, PredefinedSetKind, Setup};
pub use key::{DataPoint, Key, KeyKind};
pub use value::{Value, ValueKind};

/// Opaque identifier of a graph instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instance(String);

impl Instance {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Instance {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Instance {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
