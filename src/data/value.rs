use std::fmt;

use chrono::{DateTime, FixedOffset};

use super::{Decimal, Instance};

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Decimal(Decimal),
    String(String),
    Date(DateTime<FixedOffset>),
    Buffer(Vec<u8>),
}

/// A literal value, optionally bound to the instance it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    kind: ValueKind,
    instance: Option<Instance>,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            instance: None,
        }
    }

    pub fn with_instance(kind: ValueKind, instance: Instance) -> Self {
        Self {
            kind,
            instance: Some(instance),
        }
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueKind::Boolean(value))
    }

    pub fn decimal(value: impl Into<Decimal>) -> Self {
        Self::new(ValueKind::Decimal(value.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn date(value: DateTime<FixedOffset>) -> Self {
        Self::new(ValueKind::Date(value))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn as_decimal(&self) -> Option<&Decimal> {
        match &self.kind {
            ValueKind::Decimal(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Boolean(b) => write!(f, "{b}"),
            ValueKind::Decimal(d) => write!(f, "{d}"),
            ValueKind::String(s) => write!(f, "{s:?}"),
            ValueKind::Date(d) => write!(f, "{}", d.to_rfc3339()),
            ValueKind::Buffer(b) => write!(f, "<{} bytes>", b.len()),
        }?;
        if let Some(instance) = &self.instance {
            write!(f, " @{instance}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_instance() {
        let value = Value::with_instance(ValueKind::Boolean(true), Instance::from("node-1"));
        assert_eq!(value.to_string(), "true @node-1");
        assert_eq!(Value::string("x").to_string(), "\"x\"");
    }

    #[test]
    fn accessors() {
        let value = Value::decimal(12_i32);
        assert_eq!(value.as_decimal(), Some(&Decimal::I32(12)));
        assert!(value.instance().is_none());
        assert!(Value::null().is_null());
    }
}
