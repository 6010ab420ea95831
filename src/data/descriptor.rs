use std::collections::BTreeMap;

use bincode::{Decode, Encode};

use super::{Instance, Value};

/// Named relationship sets every peer understands without a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedSetKind {
    Parent,
    Child,
    Siblings,
    Ancestors,
    Descendants,
}

impl PredefinedSetKind {
    pub const fn ident(self) -> u8 {
        match self {
            Self::Parent => 0,
            Self::Child => 1,
            Self::Siblings => 2,
            Self::Ancestors => 3,
            Self::Descendants => 4,
        }
    }

    pub fn from_ident(ident: u8) -> Option<Self> {
        match ident {
            0 => Some(Self::Parent),
            1 => Some(Self::Child),
            2 => Some(Self::Siblings),
            3 => Some(Self::Ancestors),
            4 => Some(Self::Descendants),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Instance(Instance),
    Value(Value),
}

/// User-supplied function body, executed by the peer's `runtime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaFunction {
    pub runtime: String,
    pub name: Option<String>,
    pub scope_id: String,
    pub source: String,
}

/// One node of a set expression.
///
/// Descriptors are produced by [`SetBuilder`](crate::builder::SetBuilder)
/// and are never rewritten afterwards: the order of members is the order
/// they were added in.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Literal(Literal),
    PredefinedSet(PredefinedSetKind),
    Union(Vec<Descriptor>),
    Intersection(Vec<Descriptor>),
    Transformation {
        left: Vec<Descriptor>,
        right: Vec<Descriptor>,
    },
    PredefinedFunction {
        name: String,
        arguments: Vec<Descriptor>,
    },
    Lambda(LambdaFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode)]
pub enum MutationType {
    #[default]
    Overwrite,
    Append,
}

/// Target expression and options of a conversation, as carried by the setup
/// handshake.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Setup {
    /// Members of the implicit root intersection.
    pub target: Vec<Descriptor>,
    pub client_options: BTreeMap<String, String>,
    /// Present for mutation conversations only.
    pub mutation_type: Option<MutationType>,
}

impl Setup {
    /// The whole target as a single descriptor.
    pub fn target_descriptor(&self) -> Descriptor {
        Descriptor::Intersection(self.target.clone())
    }

    /// Instance id of a target made of one instance literal, if that is its shape.
    pub fn single_instance(&self) -> Option<&Instance> {
        match self.target.as_slice() {
            [Descriptor::Literal(Literal::Instance(id))] => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predefined_set_idents() {
        for kind in [
            PredefinedSetKind::Parent,
            PredefinedSetKind::Child,
            PredefinedSetKind::Siblings,
            PredefinedSetKind::Ancestors,
            PredefinedSetKind::Descendants,
        ] {
            assert_eq!(PredefinedSetKind::from_ident(kind.ident()), Some(kind));
        }
        assert_eq!(PredefinedSetKind::from_ident(5), None);
    }

    #[test]
    fn single_instance_target() {
        let mut setup = Setup {
            target: vec![Descriptor::Literal(Literal::Instance("A".into()))],
            ..Default::default()
        };
        assert_eq!(setup.single_instance(), Some(&Instance::from("A")));

        setup.target.push(Descriptor::PredefinedSet(PredefinedSetKind::Child));
        assert_eq!(setup.single_instance(), None);
    }
}
