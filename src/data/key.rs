use std::fmt;

use super::{Instance, Value};

/// Discriminates a named member from a positional one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Member(String),
    Index(i64),
}

/// One step of a key path: which member of which instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    kind: KeyKind,
    instance: Instance,
}

impl Key {
    pub fn member(name: impl Into<String>, instance: Instance) -> Self {
        Self {
            kind: KeyKind::Member(name.into()),
            instance,
        }
    }

    pub fn index(index: i64, instance: Instance) -> Self {
        Self {
            kind: KeyKind::Index(index),
            instance,
        }
    }

    pub fn kind(&self) -> &KeyKind {
        &self.kind
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            KeyKind::Member(name) => write!(f, "{name}"),
            KeyKind::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A value together with the key path leading to it, root first.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    keys: Vec<Key>,
    value: Value,
}

impl DataPoint {
    pub fn new(keys: Vec<Key>, value: Value) -> Self {
        Self { keys, value }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (Vec<Key>, Value) {
        (self.keys, self.value)
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .keys
            .iter()
            .map(Key::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{path} = {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_path() {
        let root = Instance::from("A");
        let point = DataPoint::new(
            vec![Key::member("tags", root.clone()), Key::index(2, root)],
            Value::string("red"),
        );

        assert_eq!(point.to_string(), "tags.[2] = \"red\"");
        assert_eq!(point.keys()[1].kind(), &KeyKind::Index(2));
    }
}
