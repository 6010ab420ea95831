//! Stack-discipline builder for set expressions.
//!
//! # Overview
//!
//! A set expression is built with paired `enter_*`/`leave_*` calls that nest
//! like parentheses, with leaf calls (`add_*`) in between. The builder keeps
//! an arena of open scopes; each scope owns a partial fragment of one
//! [`Descriptor`] variant and the index of its parent. Leaving a scope
//! validates the fragment, pops it and merges the finished piece into the
//! parent.
//!
//! Which call is legal where is decided by one table,
//! [`ScopeKind::permits`]. Every illegal call fails immediately, before
//! anything is mutated, and poisons the builder: a builder that failed once
//! must be discarded.
//!
//! ```
//! use mishmash::builder::SetBuilder;
//!
//! let mut builder = SetBuilder::new();
//! builder
//!     .enter_intersection()?
//!     .add_instance("A")?
//!     .enter_union()?
//!     .add_predefined_set_child()?
//!     .add_predefined_set_parent()?
//!     .leave_union()?
//!     .leave_intersection()?;
//! let setup = builder.build()?;
//! assert_eq!(setup.target.len(), 2);
//! # Ok::<(), mishmash::MishmashError>(())
//! ```
//!
//! # See Also
//!
//! - [`decode`](crate::protocol::decode): replays a wire tree through this builder.
mod scope;

use std::{collections::BTreeMap, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset};

pub use scope::{Operation, ScopeKind};
use scope::{Fragment, Scope};

use crate::{
    data::{
        Decimal, Descriptor, Instance, Literal, MutationType, PredefinedSetKind, Setup, Value,
        ValueKind,
    },
    error::MishmashError,
};

type Step<'a> = Result<&'a mut SetBuilder, MishmashError>;

/// Builds one [`Setup`] through nested scope calls.
#[derive(Debug)]
pub struct SetBuilder {
    scopes: Vec<Scope>,
    client_options: BTreeMap<String, String>,
    mutation_type: Option<MutationType>,
    poisoned: bool,
}

impl Default for SetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SetBuilder {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::root()],
            client_options: BTreeMap::new(),
            mutation_type: None,
            poisoned: false,
        }
    }

    /// Kind of the innermost open scope.
    pub fn scope(&self) -> ScopeKind {
        self.current().kind
    }

    /// Number of open scopes above the root.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn set_client_options(&mut self, options: BTreeMap<String, String>) -> &mut Self {
        self.client_options = options;
        self
    }

    pub fn set_client_option(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.client_options.insert(key.into(), value.into());
        self
    }

    /// Marks the setup as a mutation of the given type.
    pub fn set_mutation_type(&mut self, mutation_type: MutationType) -> &mut Self {
        self.mutation_type = Some(mutation_type);
        self
    }

    /// Finishes the expression.
    ///
    /// Fails if the builder was poisoned, if scopes are still open or if the
    /// target intersection was never built.
    pub fn build(self) -> Result<Setup, MishmashError> {
        if self.poisoned {
            return Err(poisoned());
        }
        if self.scopes.len() != 1 {
            return Err(MishmashError::InvalidState(format!(
                "{} scope(s) still open, innermost is {}",
                self.depth(),
                self.scope()
            )));
        }

        let target = match self.scopes.into_iter().next().map(|s| s.fragment) {
            Some(Fragment::Root {
                target: Some(target),
            }) => target,
            _ => {
                return Err(MishmashError::InvalidState(
                    "no target intersection was built".to_string(),
                ));
            }
        };

        Ok(Setup {
            target,
            client_options: self.client_options,
            mutation_type: self.mutation_type,
        })
    }

    pub fn enter_union(&mut self) -> Step<'_> {
        self.step(|b| b.open(Operation::EnterUnion, ScopeKind::Union, Fragment::List(vec![])))
    }

    pub fn leave_union(&mut self) -> Step<'_> {
        self.step(|b| b.close(Operation::LeaveUnion))
    }

    pub fn enter_intersection(&mut self) -> Step<'_> {
        self.step(|b| {
            b.open(
                Operation::EnterIntersection,
                ScopeKind::Intersection,
                Fragment::List(vec![]),
            )
        })
    }

    pub fn leave_intersection(&mut self) -> Step<'_> {
        self.step(|b| b.close(Operation::LeaveIntersection))
    }

    pub fn enter_transformation(&mut self) -> Step<'_> {
        self.step(|b| {
            b.open(
                Operation::EnterTransformation,
                ScopeKind::Transformation,
                Fragment::Transformation {
                    left: None,
                    right: None,
                },
            )
        })
    }

    pub fn leave_transformation(&mut self) -> Step<'_> {
        self.step(|b| b.close(Operation::LeaveTransformation))
    }

    /// Opens the left axis of the current transformation.
    ///
    /// Called directly inside an empty, freshly entered intersection, it turns
    /// that intersection into a transformation first. This is the sequence
    /// the wire decoder emits for transformation nodes.
    pub fn enter_transformation_left(&mut self) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::EnterTransformationLeft)?;
            if b.scope() == ScopeKind::Intersection {
                b.convert_to_transformation()?;
            }
            if let Fragment::Transformation { left: Some(_), .. } = b.current().fragment {
                return Err(MishmashError::InvalidState(
                    "transformation left axis was already entered".to_string(),
                ));
            }
            b.push(ScopeKind::TransformationLeft, Fragment::List(vec![]));
            Ok(())
        })
    }

    pub fn leave_transformation_left(&mut self) -> Step<'_> {
        self.step(|b| b.close(Operation::LeaveTransformationLeft))
    }

    pub fn enter_transformation_right(&mut self) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::EnterTransformationRight)?;
            if let Fragment::Transformation { right: Some(_), .. } = b.current().fragment {
                return Err(MishmashError::InvalidState(
                    "transformation right axis was already entered".to_string(),
                ));
            }
            b.push(ScopeKind::TransformationRight, Fragment::List(vec![]));
            Ok(())
        })
    }

    pub fn leave_transformation_right(&mut self) -> Step<'_> {
        self.step(|b| b.close(Operation::LeaveTransformationRight))
    }

    pub fn enter_predefined_function(&mut self, name: &str) -> Step<'_> {
        self.step(|b| {
            if name.is_empty() {
                return Err(MishmashError::InvalidArgument(
                    "predefined function name cannot be empty".to_string(),
                ));
            }
            b.open(
                Operation::EnterPredefinedFunction,
                ScopeKind::PredefinedFunction,
                Fragment::Function {
                    name: name.to_string(),
                    arguments: vec![],
                },
            )
        })
    }

    pub fn leave_predefined_function(&mut self, name: &str) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::LeavePredefinedFunction)?;
            if let Fragment::Function { name: open, .. } = &b.current().fragment {
                if open != name {
                    return Err(MishmashError::InvalidArgument(format!(
                        "leaving predefined function '{name}' but '{open}' is open"
                    )));
                }
            }
            b.close_current()
        })
    }

    /// Opens argument `index`; arguments must be entered in order from zero.
    pub fn enter_predefined_function_argument(&mut self, index: usize) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::EnterPredefinedFunctionArgument)?;
            let expected = match &b.current().fragment {
                Fragment::Function { arguments, .. } => arguments.len(),
                _ => {
                    return Err(MishmashError::Internal(
                        "predefined function scope without function fragment".to_string(),
                    ));
                }
            };
            if index != expected {
                return Err(MishmashError::InvalidArgument(format!(
                    "expected predefined function argument {expected}, got {index}"
                )));
            }
            b.push(
                ScopeKind::PredefinedFunctionArgument,
                Fragment::Argument { index, slot: None },
            );
            Ok(())
        })
    }

    pub fn leave_predefined_function_argument(&mut self, index: usize) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::LeavePredefinedFunctionArgument)?;
            if let Fragment::Argument { index: open, .. } = b.current().fragment {
                if open != index {
                    return Err(MishmashError::InvalidArgument(format!(
                        "leaving predefined function argument {index} but {open} is open"
                    )));
                }
            }
            b.close_current()
        })
    }

    pub fn enter_new_lambda_scope(
        &mut self,
        runtime: &str,
        name: Option<&str>,
        scope_id: &str,
    ) -> Step<'_> {
        self.step(|b| {
            if runtime.is_empty() {
                return Err(MishmashError::InvalidArgument(
                    "lambda client runtime cannot be empty".to_string(),
                ));
            }
            if scope_id.is_empty() {
                return Err(MishmashError::InvalidArgument(
                    "lambda scope id cannot be empty".to_string(),
                ));
            }
            b.open(
                Operation::EnterNewLambdaScope,
                ScopeKind::NewLambda,
                Fragment::Lambda {
                    runtime: runtime.to_string(),
                    name: name.map(str::to_string),
                    scope_id: scope_id.to_string(),
                    source: None,
                },
            )
        })
    }

    /// Sets the body of the open lambda scope. Exactly one source per scope.
    pub fn add_source(&mut self, runtime: &str, name: Option<&str>, source: &str) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::AddSource)?;
            if source.is_empty() {
                return Err(MishmashError::InvalidArgument(
                    "lambda source cannot be empty".to_string(),
                ));
            }
            if let Fragment::Lambda {
                runtime: open_runtime,
                name: open_name,
                source: slot,
                ..
            } = &mut b.current_mut().fragment
            {
                if open_runtime != runtime || open_name.as_deref() != name {
                    return Err(MishmashError::InvalidArgument(format!(
                        "source for {runtime}/{name:?} does not match open lambda {open_runtime}/{open_name:?}"
                    )));
                }
                if slot.is_some() {
                    return Err(MishmashError::InvalidState(
                        "lambda scope already has a source".to_string(),
                    ));
                }
                *slot = Some(source.to_string());
            }
            Ok(())
        })
    }

    pub fn leave_new_lambda_scope(
        &mut self,
        runtime: &str,
        name: Option<&str>,
        scope_id: &str,
    ) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::LeaveNewLambdaScope)?;
            if let Fragment::Lambda {
                runtime: open_runtime,
                name: open_name,
                scope_id: open_scope,
                ..
            } = &b.current().fragment
            {
                if open_runtime != runtime || open_name.as_deref() != name || open_scope != scope_id
                {
                    return Err(MishmashError::InvalidArgument(format!(
                        "leaving lambda scope {scope_id} but {open_scope} is open"
                    )));
                }
            }
            b.close_current()
        })
    }

    /// Re-entering a lambda scope defined earlier is not supported.
    pub fn enter_existing_lambda_scope(&mut self, scope_id: &str) -> Step<'_> {
        self.step(|b| {
            b.check(Operation::EnterExistingLambdaScope)?;
            Err(MishmashError::Unimplemented(format!(
                "re-entering existing lambda scope {scope_id}"
            )))
        })
    }

    pub fn leave_existing_lambda_scope(&mut self, scope_id: &str) -> Step<'_> {
        self.step(|_| {
            Err(MishmashError::InvalidState(format!(
                "existing lambda scope {scope_id} was never entered"
            )))
        })
    }

    pub fn add_instance(&mut self, id: impl Into<Instance>) -> Step<'_> {
        let id = id.into();
        self.step(|b| {
            if id.as_str().is_empty() {
                return Err(MishmashError::InvalidArgument(
                    "instance id cannot be empty".to_string(),
                ));
            }
            b.leaf(Descriptor::Literal(Literal::Instance(id)))
        })
    }

    pub fn add_null(&mut self) -> Step<'_> {
        self.add_value(ValueKind::Null)
    }

    pub fn add_boolean(&mut self, value: bool) -> Step<'_> {
        self.add_value(ValueKind::Boolean(value))
    }

    pub fn add_string(&mut self, value: impl Into<String>) -> Step<'_> {
        self.add_value(ValueKind::String(value.into()))
    }

    pub fn add_date(&mut self, value: DateTime<FixedOffset>) -> Step<'_> {
        self.add_value(ValueKind::Date(value))
    }

    pub fn add_i32(&mut self, value: i32) -> Step<'_> {
        self.add_decimal(Decimal::I32(value))
    }

    pub fn add_u32(&mut self, value: u32) -> Step<'_> {
        self.add_decimal(Decimal::U32(value))
    }

    pub fn add_i64(&mut self, value: i64) -> Step<'_> {
        self.add_decimal(Decimal::I64(value))
    }

    pub fn add_u64(&mut self, value: u64) -> Step<'_> {
        self.add_decimal(Decimal::U64(value))
    }

    pub fn add_double(&mut self, value: f64) -> Step<'_> {
        self.add_decimal(Decimal::Double(value))
    }

    pub fn add_big_decimal(&mut self, value: BigDecimal) -> Step<'_> {
        self.add_decimal(Decimal::Big(value))
    }

    pub fn add_decimal_string(&mut self, value: &str) -> Step<'_> {
        match BigDecimal::from_str(value) {
            Ok(parsed) => self.add_big_decimal(parsed),
            Err(e) => self.step(|_| {
                Err(MishmashError::InvalidArgument(format!(
                    "'{value}' is not a decimal: {e}"
                )))
            }),
        }
    }

    pub fn add_decimal(&mut self, value: Decimal) -> Step<'_> {
        self.add_value(ValueKind::Decimal(value))
    }

    pub fn add_predefined_set(&mut self, kind: PredefinedSetKind) -> Step<'_> {
        self.step(|b| b.leaf(Descriptor::PredefinedSet(kind)))
    }

    pub fn add_predefined_set_parent(&mut self) -> Step<'_> {
        self.add_predefined_set(PredefinedSetKind::Parent)
    }

    pub fn add_predefined_set_child(&mut self) -> Step<'_> {
        self.add_predefined_set(PredefinedSetKind::Child)
    }

    pub fn add_predefined_set_siblings(&mut self) -> Step<'_> {
        self.add_predefined_set(PredefinedSetKind::Siblings)
    }

    pub fn add_predefined_set_ancestors(&mut self) -> Step<'_> {
        self.add_predefined_set(PredefinedSetKind::Ancestors)
    }

    pub fn add_predefined_set_descendants(&mut self) -> Step<'_> {
        self.add_predefined_set(PredefinedSetKind::Descendants)
    }

    fn add_value(&mut self, kind: ValueKind) -> Step<'_> {
        self.step(|b| b.leaf(Descriptor::Literal(Literal::Value(Value::new(kind)))))
    }

    /// Runs one mutation, poisoning the builder if it fails.
    fn step<F>(&mut self, op: F) -> Step<'_>
    where
        F: FnOnce(&mut Self) -> Result<(), MishmashError>,
    {
        if self.poisoned {
            return Err(poisoned());
        }
        match op(self) {
            Ok(()) => Ok(self),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn check(&self, op: Operation) -> Result<(), MishmashError> {
        let scope = self.current();
        if !scope.kind.permits(op) {
            return Err(MishmashError::InvalidState(format!(
                "{op} is not allowed in the {} scope",
                scope.kind
            )));
        }
        if op.produces_descriptor() && !scope.fragment.accepts_descriptor() {
            return Err(MishmashError::InvalidState(format!(
                "{} scope already holds its descriptor",
                scope.kind
            )));
        }
        Ok(())
    }

    fn push(&mut self, kind: ScopeKind, fragment: Fragment) {
        let parent = Some(self.scopes.len() - 1);
        self.scopes.push(Scope {
            kind,
            parent,
            fragment,
        });
    }

    fn open(&mut self, op: Operation, kind: ScopeKind, fragment: Fragment) -> Result<(), MishmashError> {
        self.check(op)?;
        self.push(kind, fragment);
        Ok(())
    }

    fn leaf(&mut self, descriptor: Descriptor) -> Result<(), MishmashError> {
        self.check(Operation::AddLeaf)?;
        self.current_mut()
            .fragment
            .merge(scope::Merged::Descriptor(descriptor))
    }

    fn close(&mut self, op: Operation) -> Result<(), MishmashError> {
        self.check(op)?;
        self.close_current()
    }

    /// Pops the innermost scope and merges its result into the parent.
    fn close_current(&mut self) -> Result<(), MishmashError> {
        self.current().ready()?;
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| MishmashError::Internal("scope arena is empty".to_string()))?;
        let parent = scope
            .parent
            .ok_or_else(|| MishmashError::Internal("closed scope has no parent".to_string()))?;
        let merged = scope.into_merged()?;

        self.scopes
            .get_mut(parent)
            .ok_or_else(|| MishmashError::Internal(format!("parent scope {parent} is missing")))?
            .fragment
            .merge(merged)
    }

    fn convert_to_transformation(&mut self) -> Result<(), MishmashError> {
        let parent_is_root = self
            .current()
            .parent
            .and_then(|p| self.scopes.get(p))
            .is_some_and(|p| p.kind == ScopeKind::Root);
        let empty = matches!(&self.current().fragment, Fragment::List(m) if m.is_empty());
        if parent_is_root || !empty {
            return Err(MishmashError::InvalidState(
                "only an empty nested intersection can host a transformation".to_string(),
            ));
        }

        let scope = self.current_mut();
        scope.kind = ScopeKind::Transformation;
        scope.fragment = Fragment::Transformation {
            left: None,
            right: None,
        };
        Ok(())
    }
}

fn poisoned() -> MishmashError {
    MishmashError::InvalidState("builder failed earlier and must be discarded".to_string())
}

#[cfg(test)]
mod tests {
    use crate::data::LambdaFunction;

    use super::*;

    fn literal(id: &str) -> Descriptor {
        Descriptor::Literal(Literal::Instance(Instance::from(id)))
    }

    #[test]
    fn nested_shape_mirrors_calls() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .add_instance("A")
            .unwrap()
            .enter_union()
            .unwrap()
            .add_predefined_set_child()
            .unwrap()
            .enter_intersection()
            .unwrap()
            .add_i32(-4)
            .unwrap()
            .leave_intersection()
            .unwrap()
            .leave_union()
            .unwrap()
            .leave_intersection()
            .unwrap();

        let setup = builder.build().unwrap();
        assert_eq!(
            setup.target,
            vec![
                literal("A"),
                Descriptor::Union(vec![
                    Descriptor::PredefinedSet(PredefinedSetKind::Child),
                    Descriptor::Intersection(vec![Descriptor::Literal(Literal::Value(
                        Value::decimal(-4_i32)
                    ))]),
                ]),
            ]
        );
    }

    #[test]
    fn root_accepts_only_one_intersection() {
        let mut builder = SetBuilder::new();
        let err = builder.add_instance("A").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));

        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .leave_intersection()
            .unwrap();
        let err = builder.enter_intersection().unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));
    }

    #[test]
    fn mismatched_leave_poisons() {
        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap().enter_union().unwrap();

        let err = builder.leave_intersection().unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));
        assert!(builder.is_poisoned());
        // nothing was merged into the parent
        assert_eq!(builder.scope(), ScopeKind::Union);
        assert_eq!(builder.depth(), 2);

        let err = builder.leave_union().unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));
        assert!(builder.build().is_err());
    }

    #[test]
    fn build_requires_closed_scopes() {
        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap();
        assert!(matches!(
            builder.build(),
            Err(MishmashError::InvalidState(_))
        ));

        assert!(matches!(
            SetBuilder::new().build(),
            Err(MishmashError::InvalidState(_))
        ));
    }

    #[test]
    fn transformation_requires_both_axes() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_transformation()
            .unwrap()
            .enter_transformation_left()
            .unwrap()
            .add_predefined_set_parent()
            .unwrap()
            .leave_transformation_left()
            .unwrap();

        let err = builder.leave_transformation().unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));
    }

    #[test]
    fn transformation_axis_entered_twice() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_transformation()
            .unwrap()
            .enter_transformation_left()
            .unwrap()
            .leave_transformation_left()
            .unwrap();

        let err = builder.enter_transformation_left().unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));
    }

    #[test]
    fn intersection_hosts_transformation() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_intersection()
            .unwrap()
            .enter_transformation_left()
            .unwrap()
            .add_predefined_set_ancestors()
            .unwrap()
            .leave_transformation_left()
            .unwrap()
            .enter_transformation_right()
            .unwrap()
            .add_string("name")
            .unwrap()
            .leave_transformation_right()
            .unwrap()
            .leave_transformation()
            .unwrap()
            .leave_intersection()
            .unwrap();

        let setup = builder.build().unwrap();
        assert_eq!(
            setup.target,
            vec![Descriptor::Transformation {
                left: vec![Descriptor::PredefinedSet(PredefinedSetKind::Ancestors)],
                right: vec![Descriptor::Literal(Literal::Value(Value::string("name")))],
            }]
        );
    }

    #[test]
    fn non_empty_intersection_cannot_host_transformation() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_intersection()
            .unwrap()
            .add_instance("A")
            .unwrap();

        assert!(builder.enter_transformation_left().is_err());

        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap();
        assert!(builder.enter_transformation_left().is_err());
    }

    #[test]
    fn predefined_function_arguments_in_order() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_predefined_function("within")
            .unwrap()
            .enter_predefined_function_argument(0)
            .unwrap()
            .add_instance("A")
            .unwrap()
            .leave_predefined_function_argument(0)
            .unwrap()
            .enter_predefined_function_argument(1)
            .unwrap()
            .enter_union()
            .unwrap()
            .leave_union()
            .unwrap()
            .leave_predefined_function_argument(1)
            .unwrap()
            .leave_predefined_function("within")
            .unwrap()
            .leave_intersection()
            .unwrap();

        let setup = builder.build().unwrap();
        assert_eq!(
            setup.target,
            vec![Descriptor::PredefinedFunction {
                name: "within".to_string(),
                arguments: vec![literal("A"), Descriptor::Union(vec![])],
            }]
        );
    }

    #[test]
    fn predefined_function_argument_errors() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_predefined_function("f")
            .unwrap();
        let err = builder.enter_predefined_function_argument(1).unwrap_err();
        assert!(matches!(err, MishmashError::InvalidArgument(_)));

        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_predefined_function("f")
            .unwrap()
            .enter_predefined_function_argument(0)
            .unwrap()
            .add_instance("A")
            .unwrap();
        let err = builder.add_instance("B").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));

        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_predefined_function("f")
            .unwrap()
            .enter_predefined_function_argument(0)
            .unwrap();
        let err = builder.leave_predefined_function_argument(0).unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));

        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_predefined_function("f")
            .unwrap();
        let err = builder.leave_predefined_function("g").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidArgument(_)));
    }

    #[test]
    fn lambda_scope() {
        let mut builder = SetBuilder::new();
        builder
            .enter_intersection()
            .unwrap()
            .enter_new_lambda_scope("js", None, "scope-1")
            .unwrap()
            .add_source("js", None, "x => x")
            .unwrap()
            .leave_new_lambda_scope("js", None, "scope-1")
            .unwrap()
            .leave_intersection()
            .unwrap();

        let setup = builder.build().unwrap();
        assert_eq!(
            setup.target,
            vec![Descriptor::Lambda(LambdaFunction {
                runtime: "js".to_string(),
                name: None,
                scope_id: "scope-1".to_string(),
                source: "x => x".to_string(),
            })]
        );
    }

    #[test]
    fn lambda_scope_errors() {
        let open = || {
            let mut builder = SetBuilder::new();
            builder
                .enter_intersection()
                .unwrap()
                .enter_new_lambda_scope("js", Some("f"), "s")
                .unwrap();
            builder
        };

        let mut builder = open();
        let err = builder.leave_new_lambda_scope("js", Some("f"), "s").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));

        let mut builder = open();
        builder.add_source("js", Some("f"), "1").unwrap();
        let err = builder.add_source("js", Some("f"), "2").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidState(_)));

        let mut builder = open();
        let err = builder.add_source("py", Some("f"), "1").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidArgument(_)));

        let mut builder = open();
        builder.add_source("js", Some("f"), "1").unwrap();
        let err = builder.leave_new_lambda_scope("js", Some("f"), "t").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidArgument(_)));
    }

    #[test]
    fn existing_lambda_scope_is_unimplemented() {
        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap();
        let err = builder.enter_existing_lambda_scope("s").unwrap_err();
        assert!(matches!(err, MishmashError::Unimplemented(_)));
    }

    #[test]
    fn options_and_mutation_type() {
        let mut builder = SetBuilder::new();
        builder
            .set_client_option("consistency", "strong")
            .set_mutation_type(MutationType::Append);
        builder
            .enter_intersection()
            .unwrap()
            .add_decimal_string("1.50")
            .unwrap()
            .leave_intersection()
            .unwrap();

        let setup = builder.build().unwrap();
        assert_eq!(setup.mutation_type, Some(MutationType::Append));
        assert_eq!(setup.client_options["consistency"], "strong");
        assert_eq!(
            setup.target,
            vec![Descriptor::Literal(Literal::Value(Value::decimal(
                Decimal::parse("1.50").unwrap()
            )))]
        );
    }

    #[test]
    fn bad_decimal_string() {
        let mut builder = SetBuilder::new();
        builder.enter_intersection().unwrap();
        let err = builder.add_decimal_string("1.2.3").unwrap_err();
        assert!(matches!(err, MishmashError::InvalidArgument(_)));
    }
}
