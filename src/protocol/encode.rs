//! Conversions from the data model into wire messages.
//!
//! Descriptors keep the decimal encoding they were built with. Decimal strings
//! are written without an exponent and dates as RFC 3339 with `Z` for UTC, so
//! a decoded tree in that form encodes back to the same wire form. Yielded
//! data points are sent in the narrowest lossless encoding instead.
use chrono::SecondsFormat;

use crate::{
    data::{DataPoint, Decimal, Descriptor, Key, KeyKind, Literal, Setup, Value, ValueKind},
    error::MishmashError,
};

use super::message;

impl From<&Decimal> for message::DecimalValue {
    fn from(value: &Decimal) -> Self {
        let kind = match value {
            Decimal::I32(v) => message::DecimalKind::SInt32(*v),
            Decimal::U32(v) => message::DecimalKind::UInt32(*v),
            Decimal::I64(v) => message::DecimalKind::SInt64(*v),
            Decimal::U64(v) => message::DecimalKind::UInt64(*v),
            Decimal::Double(v) => message::DecimalKind::Floating(*v),
            Decimal::Big(v) => message::DecimalKind::StringSequence(v.to_plain_string()),
        };
        Self { kind: Some(kind) }
    }
}

fn value_kind(kind: &ValueKind, narrow: bool) -> Result<message::Value, MishmashError> {
    let kind = match kind {
        ValueKind::Null => message::ValueKind::Null,
        ValueKind::Boolean(b) => message::ValueKind::Boolean(*b),
        ValueKind::Decimal(d) if narrow => message::ValueKind::Decimal((&d.narrowest()).into()),
        ValueKind::Decimal(d) => message::ValueKind::Decimal(d.into()),
        ValueKind::String(s) => message::ValueKind::String(s.clone()),
        ValueKind::Date(d) => {
            message::ValueKind::Date(d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        ValueKind::Buffer(_) => {
            return Err(MishmashError::Unimplemented(
                "buffer values cannot be encoded".to_string(),
            ));
        }
    };
    Ok(message::Value { kind: Some(kind) })
}

impl TryFrom<&Value> for message::Value {
    type Error = MishmashError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value_kind(value.kind(), false)
    }
}

fn descriptor_list(descriptors: &[Descriptor]) -> Result<message::SetDescriptorList, MishmashError> {
    descriptors
        .iter()
        .map(message::SetDescriptor::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(message::SetDescriptorList::from)
}

impl TryFrom<&Descriptor> for message::SetDescriptor {
    type Error = MishmashError;

    fn try_from(descriptor: &Descriptor) -> Result<Self, Self::Error> {
        let kind = match descriptor {
            Descriptor::Literal(Literal::Instance(id)) => {
                message::DescriptorKind::Literal(message::Literal {
                    kind: Some(message::LiteralKind::Id(message::Id::new(id.as_str()))),
                })
            }
            Descriptor::Literal(Literal::Value(value)) => {
                message::DescriptorKind::Literal(message::Literal {
                    kind: Some(message::LiteralKind::Value(value.try_into()?)),
                })
            }
            Descriptor::PredefinedSet(kind) => {
                message::DescriptorKind::PredefinedSet(message::PredefinedSet {
                    ident: kind.ident(),
                })
            }
            Descriptor::Union(members) => message::DescriptorKind::Union(message::Union {
                sets: Some(descriptor_list(members)?),
            }),
            Descriptor::Intersection(members) => {
                message::DescriptorKind::Intersection(message::Intersection {
                    sets: Some(descriptor_list(members)?),
                })
            }
            Descriptor::Transformation { left, right } => {
                message::DescriptorKind::Transformation(message::Transformation {
                    axis: Some(message::Axis {
                        left: Some(descriptor_list(left)?),
                        right: Some(descriptor_list(right)?),
                    }),
                })
            }
            Descriptor::PredefinedFunction { name, arguments } => {
                message::DescriptorKind::PredefinedFunction(message::PredefinedFunction {
                    name: name.clone(),
                    arguments: descriptor_list(arguments)?.descriptors,
                })
            }
            Descriptor::Lambda(lambda) => {
                message::DescriptorKind::LambdaFunction(message::LambdaFunction {
                    client_runtime: lambda.runtime.clone(),
                    name: lambda.name.clone(),
                    scope_id: lambda.scope_id.clone(),
                    body: Some(message::LambdaFunctionBody {
                        source: lambda.source.clone(),
                    }),
                })
            }
        };
        Ok(Self { kind: Some(kind) })
    }
}

impl TryFrom<&Setup> for message::Setup {
    type Error = MishmashError;

    fn try_from(setup: &Setup) -> Result<Self, Self::Error> {
        Ok(Self {
            target_set: Some(descriptor_list(&setup.target)?),
            client_options: setup.client_options.clone(),
            mutation_type: setup.mutation_type,
        })
    }
}

impl From<&Key> for message::YieldMember {
    fn from(key: &Key) -> Self {
        let member = match key.kind() {
            KeyKind::Member(name) => message::MemberKind::Name(name.clone()),
            KeyKind::Index(i) => message::MemberKind::Index(*i),
        };
        Self {
            instance_id: Some(message::Id::new(key.instance().as_str())),
            member: Some(member),
        }
    }
}

impl TryFrom<&DataPoint> for message::YieldData {
    type Error = MishmashError;

    fn try_from(point: &DataPoint) -> Result<Self, Self::Error> {
        let value = point.value();
        Ok(Self {
            hierarchy: point.keys().iter().map(message::YieldMember::from).collect(),
            value: Some(message::YieldValue {
                instance_id: value.instance().map(|i| message::Id::new(i.as_str())),
                value: Some(value_kind(value.kind(), true)?),
            }),
        })
    }
}

impl From<&MishmashError> for message::ErrorMessage {
    fn from(error: &MishmashError) -> Self {
        match error {
            MishmashError::Peer {
                code,
                message,
                additional_info,
            } => Self {
                error_code: *code,
                message: message.clone(),
                additional_info: additional_info.clone(),
            },
            other => Self {
                error_code: other.code().as_u32(),
                message: other.to_string(),
                additional_info: vec![],
            },
        }
    }
}
