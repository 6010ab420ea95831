//! Replays wire messages into the data model.
//!
//! Set expressions are never rebuilt by hand here: the decoder walks the wire
//! tree and calls the matching [`SetBuilder`] operations, so a received tree
//! is validated by exactly the same rules as one built locally. Structural
//! problems found before a builder call (missing fields, unset alternatives)
//! are protocol errors naming the offending field.
use chrono::{DateTime, FixedOffset};

use crate::{
    builder::SetBuilder,
    data::{DataPoint, Decimal, Instance, Key, PredefinedSetKind, Value, ValueKind},
    error::MishmashError,
};

use super::message;

fn require<'a, T>(field: Option<&'a T>, name: &str) -> Result<&'a T, MishmashError> {
    field.ok_or_else(|| MishmashError::Protocol(format!("{name} cannot be null")))
}

fn non_empty<'a>(field: &'a str, name: &str) -> Result<&'a str, MishmashError> {
    if field.is_empty() {
        return Err(MishmashError::Protocol(format!("{name} cannot be empty")));
    }
    Ok(field)
}

fn not_set(name: &str) -> MishmashError {
    MishmashError::Protocol(format!("{name} Type not set"))
}

/// Replays a setup message: options, mutation type, then the target
/// expression inside the root intersection.
pub fn decode_setup(setup: &message::Setup, builder: &mut SetBuilder) -> Result<(), MishmashError> {
    builder.set_client_options(setup.client_options.clone());
    if let Some(mutation_type) = setup.mutation_type {
        builder.set_mutation_type(mutation_type);
    }

    let target = setup
        .target_set
        .as_ref()
        .ok_or_else(|| MishmashError::Protocol("SETUP has no TARGET".to_string()))?;

    builder.enter_intersection()?;
    decode_descriptors(target, builder)?;
    builder.leave_intersection()?;
    Ok(())
}

pub fn decode_descriptors(
    list: &message::SetDescriptorList,
    builder: &mut SetBuilder,
) -> Result<(), MishmashError> {
    list.descriptors
        .iter()
        .try_for_each(|descriptor| decode_descriptor(descriptor, builder))
}

pub fn decode_descriptor(
    descriptor: &message::SetDescriptor,
    builder: &mut SetBuilder,
) -> Result<(), MishmashError> {
    use message::DescriptorKind;

    match descriptor.kind.as_ref().ok_or_else(|| not_set("SET DESCRIPTOR"))? {
        DescriptorKind::Literal(literal) => decode_literal(literal, builder),
        DescriptorKind::PredefinedSet(set) => {
            let kind = PredefinedSetKind::from_ident(set.ident).ok_or_else(|| {
                MishmashError::InvalidArgument(format!("unknown PREDEFINED SET {}", set.ident))
            })?;
            builder.add_predefined_set(kind)?;
            Ok(())
        }
        DescriptorKind::Union(union) => {
            let sets = require(union.sets.as_ref(), "UNION members")?;
            builder.enter_union()?;
            decode_descriptors(sets, builder)?;
            builder.leave_union()?;
            Ok(())
        }
        DescriptorKind::Intersection(intersection) => {
            let sets = require(intersection.sets.as_ref(), "INTERSECTION members")?;
            builder.enter_intersection()?;
            decode_descriptors(sets, builder)?;
            builder.leave_intersection()?;
            Ok(())
        }
        DescriptorKind::Transformation(transformation) => {
            decode_transformation(transformation, builder)
        }
        DescriptorKind::PredefinedFunction(function) => {
            let name = non_empty(&function.name, "PREDEFINED FUNC Name")?;
            builder.enter_predefined_function(name)?;
            for (index, argument) in function.arguments.iter().enumerate() {
                builder.enter_predefined_function_argument(index)?;
                decode_descriptor(argument, builder)?;
                builder.leave_predefined_function_argument(index)?;
            }
            builder.leave_predefined_function(name)?;
            Ok(())
        }
        DescriptorKind::LambdaFunction(lambda) => decode_lambda(lambda, builder),
    }
}

fn decode_transformation(
    transformation: &message::Transformation,
    builder: &mut SetBuilder,
) -> Result<(), MishmashError> {
    // all axes are checked before the builder enters the transformation
    let axis = require(transformation.axis.as_ref(), "TRANSFORM AXES")?;
    let left = require(axis.left.as_ref(), "TRANSFORM LEFT AXIS")?;
    let right = require(axis.right.as_ref(), "TRANSFORM RIGHT AXIS")?;

    builder.enter_intersection()?.enter_transformation_left()?;
    decode_descriptors(left, builder)?;
    builder
        .leave_transformation_left()?
        .enter_transformation_right()?;
    decode_descriptors(right, builder)?;
    builder
        .leave_transformation_right()?
        .leave_transformation()?;
    Ok(())
}

fn decode_lambda(
    lambda: &message::LambdaFunction,
    builder: &mut SetBuilder,
) -> Result<(), MishmashError> {
    let runtime = non_empty(&lambda.client_runtime, "LAMBDA CLIENT RUNTIME")?;
    let scope_id = non_empty(&lambda.scope_id, "SCOPE ID")?;
    let body = require(lambda.body.as_ref(), "LAMBDA FUNCTION BODY")?;
    let source = non_empty(&body.source, "FUNCTION CODE")?;
    let name = lambda.name.as_deref();

    builder
        .enter_new_lambda_scope(runtime, name, scope_id)?
        .add_source(runtime, name, source)?
        .leave_new_lambda_scope(runtime, name, scope_id)?;
    Ok(())
}

fn decode_literal(literal: &message::Literal, builder: &mut SetBuilder) -> Result<(), MishmashError> {
    match literal.kind.as_ref().ok_or_else(|| not_set("LITERAL"))? {
        message::LiteralKind::Id(id) => {
            builder.add_instance(non_empty(&id.id, "LITERAL ID")?)?;
        }
        message::LiteralKind::Value(value) => match decode_value(value)? {
            ValueKind::Null => {
                builder.add_null()?;
            }
            ValueKind::Boolean(b) => {
                builder.add_boolean(b)?;
            }
            ValueKind::Decimal(d) => {
                builder.add_decimal(d)?;
            }
            ValueKind::String(s) => {
                builder.add_string(s)?;
            }
            ValueKind::Date(d) => {
                builder.add_date(d)?;
            }
            ValueKind::Buffer(_) => return Err(buffer_unimplemented()),
        },
    }
    Ok(())
}

fn buffer_unimplemented() -> MishmashError {
    MishmashError::Unimplemented("BUFFER values".to_string())
}

/// Decodes a wire value. Buffers and big-endian decimals are not supported.
pub fn decode_value(value: &message::Value) -> Result<ValueKind, MishmashError> {
    let kind = match value.kind.as_ref().ok_or_else(|| not_set("VALUE"))? {
        message::ValueKind::Null => ValueKind::Null,
        message::ValueKind::Boolean(b) => ValueKind::Boolean(*b),
        message::ValueKind::String(s) => ValueKind::String(s.clone()),
        message::ValueKind::Date(s) => ValueKind::Date(decode_date(s)?),
        message::ValueKind::Decimal(d) => ValueKind::Decimal(decode_decimal(d)?),
        message::ValueKind::Buffer(_) => return Err(buffer_unimplemented()),
    };
    Ok(kind)
}

/// Accepts ISO-8601 date-times with an offset. Seconds may be omitted and a
/// trailing `[Region/City]` zone id is ignored in favour of the offset.
fn decode_date(text: &str) -> Result<DateTime<FixedOffset>, MishmashError> {
    let text = non_empty(text, "DATE VALUE")?;
    let offset_text = match text.split_once('[') {
        Some((date, zone)) if zone.ends_with(']') => date,
        _ => text,
    };

    DateTime::parse_from_rfc3339(offset_text)
        .or_else(|e| {
            let minutes = match offset_text.strip_suffix('Z') {
                Some(local) => format!("{local}+00:00"),
                None => offset_text.to_string(),
            };
            DateTime::parse_from_str(&minutes, "%Y-%m-%dT%H:%M%:z").map_err(|_| e)
        })
        .map_err(|e| MishmashError::field_format("DATE VALUE", text, e))
}

pub fn decode_decimal(value: &message::DecimalValue) -> Result<Decimal, MishmashError> {
    use message::DecimalKind;

    let decimal = match value.kind.as_ref().ok_or_else(|| not_set("DECIMAL VALUE"))? {
        DecimalKind::SInt32(v) => Decimal::I32(*v),
        DecimalKind::UInt32(v) => Decimal::U32(*v),
        DecimalKind::SInt64(v) => Decimal::I64(*v),
        DecimalKind::UInt64(v) => Decimal::U64(*v),
        DecimalKind::Floating(v) => Decimal::Double(*v),
        DecimalKind::StringSequence(s) => {
            let s = non_empty(s, "DECIMAL STRING")?;
            Decimal::parse(s).map_err(|e| MishmashError::field_format("DECIMAL STRING", s, e))?
        }
        DecimalKind::BigDecimal(_) => {
            return Err(MishmashError::Unimplemented(
                "big-endian DECIMAL values".to_string(),
            ));
        }
    };
    Ok(decimal)
}

fn decode_instance(id: &message::Id, name: &str) -> Result<Instance, MishmashError> {
    Ok(Instance::new(non_empty(&id.id, name)?))
}

pub fn decode_key(member: &message::YieldMember) -> Result<Key, MishmashError> {
    let instance = decode_instance(require(member.instance_id.as_ref(), "Member Id")?, "Member Id")?;
    let key = match require(member.member.as_ref(), "Member")? {
        message::MemberKind::Name(name) => {
            Key::member(non_empty(name, "Member Name")?, instance)
        }
        message::MemberKind::Index(index) => Key::index(*index, instance),
    };
    Ok(key)
}

/// Decodes one yielded data point.
pub fn decode_data_point(data: &message::YieldData) -> Result<DataPoint, MishmashError> {
    let keys = data
        .hierarchy
        .iter()
        .map(decode_key)
        .collect::<Result<Vec<_>, _>>()?;

    let yielded = require(data.value.as_ref(), "YIELD VALUE")?;
    let kind = decode_value(require(yielded.value.as_ref(), "YIELD VALUE Value")?)?;
    let value = match &yielded.instance_id {
        Some(id) => Value::with_instance(kind, decode_instance(id, "YIELD VALUE Id")?),
        None => Value::new(kind),
    };
    Ok(DataPoint::new(keys, value))
}

impl From<&message::ErrorMessage> for MishmashError {
    fn from(error: &message::ErrorMessage) -> Self {
        Self::Peer {
            code: error.error_code,
            message: error.message.clone(),
            additional_info: error.additional_info.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::{builder::ScopeKind, data::KeyKind};

    use super::*;

    fn wire(kind: message::DescriptorKind) -> message::SetDescriptor {
        message::SetDescriptor { kind: Some(kind) }
    }

    fn list(descriptors: Vec<message::SetDescriptor>) -> Option<message::SetDescriptorList> {
        Some(descriptors.into())
    }

    fn id(value: &str) -> message::SetDescriptor {
        wire(message::DescriptorKind::Literal(message::Literal {
            kind: Some(message::LiteralKind::Id(message::Id::new(value))),
        }))
    }

    fn value(kind: message::ValueKind) -> message::SetDescriptor {
        wire(message::DescriptorKind::Literal(message::Literal {
            kind: Some(message::LiteralKind::Value(message::Value { kind: Some(kind) })),
        }))
    }

    fn decimal(kind: message::DecimalKind) -> message::SetDescriptor {
        value(message::ValueKind::Decimal(message::DecimalValue { kind: Some(kind) }))
    }

    fn predefined(kind: PredefinedSetKind) -> message::SetDescriptor {
        wire(message::DescriptorKind::PredefinedSet(message::PredefinedSet {
            ident: kind.ident(),
        }))
    }

    fn transformation(
        left: Vec<message::SetDescriptor>,
        right: Vec<message::SetDescriptor>,
    ) -> message::SetDescriptor {
        wire(message::DescriptorKind::Transformation(message::Transformation {
            axis: Some(message::Axis {
                left: list(left),
                right: list(right),
            }),
        }))
    }

    fn setup(target: Vec<message::SetDescriptor>) -> message::Setup {
        message::Setup {
            target_set: list(target),
            client_options: BTreeMap::from([("mode".to_string(), "fast".to_string())]),
            mutation_type: None,
        }
    }

    fn rich_tree() -> Vec<message::SetDescriptor> {
        use message::{DecimalKind, DescriptorKind, ValueKind};

        vec![
            id("A"),
            wire(DescriptorKind::Union(message::Union { sets: list(vec![]) })),
            wire(DescriptorKind::Intersection(message::Intersection {
                sets: list(vec![
                    value(ValueKind::Null),
                    value(ValueKind::Boolean(false)),
                    value(ValueKind::String("label".to_string())),
                    value(ValueKind::Date("2019-05-01T10:00:00+02:00".to_string())),
                    decimal(DecimalKind::SInt32(-3)),
                    decimal(DecimalKind::UInt32(u32::MAX)),
                    decimal(DecimalKind::SInt64(i64::MIN)),
                    decimal(DecimalKind::UInt64(u64::MAX)),
                    decimal(DecimalKind::Floating(2.5)),
                    decimal(DecimalKind::StringSequence(
                        "3.14159265358979323846264338327950288".to_string(),
                    )),
                ]),
            })),
            transformation(
                vec![
                    predefined(PredefinedSetKind::Ancestors),
                    transformation(vec![predefined(PredefinedSetKind::Child)], vec![]),
                ],
                vec![id("B")],
            ),
            wire(DescriptorKind::PredefinedFunction(message::PredefinedFunction {
                name: "within".to_string(),
                arguments: vec![
                    id("C"),
                    wire(DescriptorKind::Union(message::Union {
                        sets: list(vec![
                            predefined(PredefinedSetKind::Parent),
                            predefined(PredefinedSetKind::Siblings),
                        ]),
                    })),
                ],
            })),
            wire(DescriptorKind::LambdaFunction(message::LambdaFunction {
                client_runtime: "js".to_string(),
                name: None,
                scope_id: "scope-1".to_string(),
                body: Some(message::LambdaFunctionBody {
                    source: "p => p.size > 3".to_string(),
                }),
            })),
            wire(DescriptorKind::LambdaFunction(message::LambdaFunction {
                client_runtime: "js".to_string(),
                name: Some("big".to_string()),
                scope_id: "scope-2".to_string(),
                body: Some(message::LambdaFunctionBody {
                    source: "p => p".to_string(),
                }),
            })),
            predefined(PredefinedSetKind::Descendants),
        ]
    }

    #[test]
    fn decoded_tree_encodes_back_identically() {
        let original = setup(rich_tree());
        let mut builder = SetBuilder::new();
        decode_setup(&original, &mut builder).unwrap();

        let decoded = builder.build().unwrap();
        let encoded = message::Setup::try_from(&decoded).unwrap();
        assert_eq!(encoded, original);
    }

    #[test]
    fn canonical_literals_encode_back_identically() {
        use message::{DecimalKind, ValueKind};

        let original = setup(vec![
            decimal(DecimalKind::StringSequence("0.0000000000001".to_string())),
            decimal(DecimalKind::StringSequence("-1000".to_string())),
            value(ValueKind::Date("2019-05-01T10:00:00Z".to_string())),
            value(ValueKind::Date("2019-05-01T10:00:00.250+02:00".to_string())),
        ]);
        let mut builder = SetBuilder::new();
        decode_setup(&original, &mut builder).unwrap();

        let encoded = message::Setup::try_from(&builder.build().unwrap()).unwrap();
        assert_eq!(encoded, original);
    }

    #[test]
    fn exponent_decimals_are_sent_plain() {
        let decoded = decode_decimal(&message::DecimalValue {
            kind: Some(message::DecimalKind::StringSequence("1E+3".to_string())),
        })
        .unwrap();

        let encoded = message::DecimalValue::from(&decoded);
        assert_eq!(
            encoded.kind,
            Some(message::DecimalKind::StringSequence("1000".to_string()))
        );
        assert_eq!(decode_decimal(&encoded).unwrap(), decoded);
    }

    #[test]
    fn iso_dates_without_seconds_or_with_zone_ids() {
        let expected = DateTime::parse_from_rfc3339("2019-05-01T10:00:00+02:00").unwrap();
        let cases = [
            "2019-05-01T10:00+02:00",
            "2019-05-01T10:00:00+02:00[Europe/Paris]",
            "2019-05-01T10:00+02:00[Europe/Paris]",
        ];
        for text in cases {
            let decoded = decode_value(&message::Value {
                kind: Some(message::ValueKind::Date(text.to_string())),
            })
            .unwrap();
            assert_eq!(decoded, ValueKind::Date(expected), "{text}");
        }

        let utc = decode_date("2019-05-01T08:00Z").unwrap();
        assert_eq!(utc, expected);
        assert_eq!(utc.offset().local_minus_utc(), 0);
    }

    #[test]
    fn mutation_type_is_replayed() {
        let mut original = setup(vec![id("A")]);
        original.mutation_type = Some(message::MutationType::Append);

        let mut builder = SetBuilder::new();
        decode_setup(&original, &mut builder).unwrap();
        let decoded = builder.build().unwrap();

        assert_eq!(decoded.mutation_type, Some(message::MutationType::Append));
        assert_eq!(decoded.client_options["mode"], "fast");
    }

    #[test]
    fn transformation_without_right_axis() {
        let broken = wire(message::DescriptorKind::Transformation(message::Transformation {
            axis: Some(message::Axis {
                left: list(vec![id("A")]),
                right: None,
            }),
        }));

        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap();
        let err = decode_descriptor(&broken, &mut builder).unwrap_err();

        assert_eq!(
            err,
            MishmashError::Protocol("TRANSFORM RIGHT AXIS cannot be null".to_string())
        );
        assert_eq!(builder.scope(), ScopeKind::Intersection);
        assert_eq!(builder.depth(), 1);
        assert!(!builder.is_poisoned());
    }

    #[test]
    fn transformation_without_axes() {
        let broken = wire(message::DescriptorKind::Transformation(message::Transformation {
            axis: None,
        }));
        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap();

        let err = decode_descriptor(&broken, &mut builder).unwrap_err();
        assert!(err.to_string().contains("TRANSFORM AXES"));
    }

    #[test]
    fn setup_without_target() {
        let mut builder = SetBuilder::new();
        let err = decode_setup(
            &message::Setup {
                target_set: None,
                client_options: BTreeMap::new(),
                mutation_type: None,
            },
            &mut builder,
        )
        .unwrap_err();

        assert_eq!(err, MishmashError::Protocol("SETUP has no TARGET".to_string()));
    }

    #[test]
    fn unset_descriptor() {
        let mut builder = SetBuilder::new();
        let err = decode_setup(&setup(vec![message::SetDescriptor { kind: None }]), &mut builder)
            .unwrap_err();
        assert_eq!(
            err,
            MishmashError::Protocol("SET DESCRIPTOR Type not set".to_string())
        );
    }

    #[test]
    fn unknown_predefined_set() {
        let mut builder = SetBuilder::new();
        let target = vec![wire(message::DescriptorKind::PredefinedSet(
            message::PredefinedSet { ident: 42 },
        ))];
        let err = decode_setup(&setup(target), &mut builder).unwrap_err();
        assert!(matches!(err, MishmashError::InvalidArgument(_)));
    }

    #[test]
    fn malformed_date_keeps_field_and_text() {
        let mut builder = SetBuilder::new();
        let target = vec![value(message::ValueKind::Date("last tuesday".to_string()))];
        let err = decode_setup(&setup(target), &mut builder).unwrap_err();

        match err {
            MishmashError::FieldFormat { field, value, .. } => {
                assert_eq!(field, "DATE VALUE");
                assert_eq!(value, "last tuesday");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn malformed_decimal_string() {
        let err = decode_decimal(&message::DecimalValue {
            kind: Some(message::DecimalKind::StringSequence("1e".to_string())),
        })
        .unwrap_err();
        assert!(matches!(err, MishmashError::FieldFormat { .. }));
    }

    #[test]
    fn unsupported_values() {
        let err = decode_value(&message::Value {
            kind: Some(message::ValueKind::Buffer(vec![0])),
        })
        .unwrap_err();
        assert!(matches!(err, MishmashError::Unimplemented(_)));

        let err = decode_decimal(&message::DecimalValue {
            kind: Some(message::DecimalKind::BigDecimal(message::BigEndianDecimal {
                negative: false,
                integer_part: vec![1],
                fractional_part: vec![],
            })),
        })
        .unwrap_err();
        assert!(matches!(err, MishmashError::Unimplemented(_)));
    }

    #[test]
    fn lambda_requires_code() {
        let mut builder = SetBuilder::new();
        let target = vec![wire(message::DescriptorKind::LambdaFunction(
            message::LambdaFunction {
                client_runtime: "js".to_string(),
                name: None,
                scope_id: "s".to_string(),
                body: Some(message::LambdaFunctionBody {
                    source: String::new(),
                }),
            },
        ))];
        let err = decode_setup(&setup(target), &mut builder).unwrap_err();
        assert_eq!(
            err,
            MishmashError::Protocol("FUNCTION CODE cannot be empty".to_string())
        );
    }

    #[test]
    fn data_point_with_index_and_instance() {
        let data = message::YieldData {
            hierarchy: vec![
                message::YieldMember {
                    instance_id: Some(message::Id::new("A")),
                    member: Some(message::MemberKind::Name("tags".to_string())),
                },
                message::YieldMember {
                    instance_id: Some(message::Id::new("A")),
                    member: Some(message::MemberKind::Index(3)),
                },
            ],
            value: Some(message::YieldValue {
                instance_id: Some(message::Id::new("T")),
                value: Some(message::Value {
                    kind: Some(message::ValueKind::Decimal(message::DecimalValue {
                        kind: Some(message::DecimalKind::UInt64(u64::MAX)),
                    })),
                }),
            }),
        };

        let point = decode_data_point(&data).unwrap();
        assert_eq!(point.keys()[1].kind(), &KeyKind::Index(3));
        assert_eq!(point.value().instance(), Some(&Instance::from("T")));
        assert_eq!(point.value().as_decimal(), Some(&Decimal::U64(u64::MAX)));
    }

    #[test]
    fn data_point_member_without_instance() {
        let data = message::YieldData {
            hierarchy: vec![message::YieldMember {
                instance_id: None,
                member: Some(message::MemberKind::Index(0)),
            }],
            value: None,
        };
        let err = decode_data_point(&data).unwrap_err();
        assert_eq!(err, MishmashError::Protocol("Member Id cannot be null".to_string()));
    }

    #[test]
    fn yielded_decimals_survive_the_trip() {
        let values = vec![
            Decimal::I64(-12),
            Decimal::U64(1 << 50),
            Decimal::Double(f64::NEG_INFINITY),
            Decimal::Double(-0.5),
            Decimal::parse("-98765432109876543210.125").unwrap(),
            Decimal::parse("123456789012345678901234567890").unwrap(),
        ];

        for original in values {
            let point = DataPoint::new(vec![], Value::decimal(original.clone()));
            let data = message::YieldData::try_from(&point).unwrap();
            let decoded = decode_data_point(&data).unwrap();
            let decoded = decoded.value().as_decimal().unwrap();

            assert_eq!(decoded.has_sign(), original.has_sign(), "{original}");
            assert_eq!(decoded.has_fraction(), original.has_fraction(), "{original}");
            assert_eq!(decoded.fits_32(), original.fits_32(), "{original}");
            assert_eq!(decoded.fits_64(), original.fits_64(), "{original}");
            assert_eq!(decoded.is_infinite(), original.is_infinite(), "{original}");
            assert_eq!(decoded.to_big_decimal(), original.to_big_decimal(), "{original}");
        }

        let nan = DataPoint::new(vec![], Value::decimal(f64::NAN));
        let data = message::YieldData::try_from(&nan).unwrap();
        let decoded = decode_data_point(&data).unwrap();
        assert!(decoded.value().as_decimal().unwrap().is_nan());
    }
}
