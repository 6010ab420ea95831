//! Scope kinds, the permission table and the partial fragments each scope owns.
use std::fmt;

use crate::{
    data::{Descriptor, LambdaFunction},
    error::MishmashError,
};

/// Kind of the builder's current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Root,
    Union,
    Intersection,
    Transformation,
    TransformationLeft,
    TransformationRight,
    PredefinedFunction,
    PredefinedFunctionArgument,
    NewLambda,
}

/// Every mutation a builder can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AddLeaf,
    EnterUnion,
    LeaveUnion,
    EnterIntersection,
    LeaveIntersection,
    EnterTransformation,
    LeaveTransformation,
    EnterTransformationLeft,
    LeaveTransformationLeft,
    EnterTransformationRight,
    LeaveTransformationRight,
    EnterPredefinedFunction,
    LeavePredefinedFunction,
    EnterPredefinedFunctionArgument,
    LeavePredefinedFunctionArgument,
    EnterNewLambdaScope,
    AddSource,
    LeaveNewLambdaScope,
    EnterExistingLambdaScope,
}

impl Operation {
    /// Operations whose result is one descriptor merged into the current scope.
    pub const fn produces_descriptor(self) -> bool {
        matches!(
            self,
            Self::AddLeaf
                | Self::EnterUnion
                | Self::EnterIntersection
                | Self::EnterTransformation
                | Self::EnterPredefinedFunction
                | Self::EnterNewLambdaScope
                | Self::EnterExistingLambdaScope
        )
    }
}

impl ScopeKind {
    /// The permission table.
    pub fn permits(self, op: Operation) -> bool {
        use Operation::*;

        match self {
            Self::Root => op == EnterIntersection,
            Self::Union => op.produces_descriptor() || op == LeaveUnion,
            // An empty intersection may be turned into a transformation, see
            // `SetBuilder::enter_transformation_left`.
            Self::Intersection => {
                op.produces_descriptor()
                    || op == LeaveIntersection
                    || op == EnterTransformationLeft
            }
            Self::TransformationLeft => op.produces_descriptor() || op == LeaveTransformationLeft,
            Self::TransformationRight => op.produces_descriptor() || op == LeaveTransformationRight,
            Self::Transformation => matches!(
                op,
                EnterTransformationLeft | EnterTransformationRight | LeaveTransformation
            ),
            Self::PredefinedFunction => {
                matches!(op, EnterPredefinedFunctionArgument | LeavePredefinedFunction)
            }
            Self::PredefinedFunctionArgument => {
                op.produces_descriptor() || op == LeavePredefinedFunctionArgument
            }
            Self::NewLambda => matches!(op, AddSource | LeaveNewLambdaScope),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Root => "root",
            Self::Union => "union",
            Self::Intersection => "intersection",
            Self::Transformation => "transformation",
            Self::TransformationLeft => "transformation left axis",
            Self::TransformationRight => "transformation right axis",
            Self::PredefinedFunction => "predefined function",
            Self::PredefinedFunctionArgument => "predefined function argument",
            Self::NewLambda => "new lambda",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddLeaf => "add",
            Self::EnterUnion => "enter_union",
            Self::LeaveUnion => "leave_union",
            Self::EnterIntersection => "enter_intersection",
            Self::LeaveIntersection => "leave_intersection",
            Self::EnterTransformation => "enter_transformation",
            Self::LeaveTransformation => "leave_transformation",
            Self::EnterTransformationLeft => "enter_transformation_left",
            Self::LeaveTransformationLeft => "leave_transformation_left",
            Self::EnterTransformationRight => "enter_transformation_right",
            Self::LeaveTransformationRight => "leave_transformation_right",
            Self::EnterPredefinedFunction => "enter_predefined_function",
            Self::LeavePredefinedFunction => "leave_predefined_function",
            Self::EnterPredefinedFunctionArgument => "enter_predefined_function_argument",
            Self::LeavePredefinedFunctionArgument => "leave_predefined_function_argument",
            Self::EnterNewLambdaScope => "enter_new_lambda_scope",
            Self::AddSource => "add_source",
            Self::LeaveNewLambdaScope => "leave_new_lambda_scope",
            Self::EnterExistingLambdaScope => "enter_existing_lambda_scope",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// Partial descriptor owned by an open scope.
#[derive(Debug)]
pub(crate) enum Fragment {
    Root {
        target: Option<Vec<Descriptor>>,
    },
    List(Vec<Descriptor>),
    Transformation {
        left: Option<Vec<Descriptor>>,
        right: Option<Vec<Descriptor>>,
    },
    Function {
        name: String,
        arguments: Vec<Descriptor>,
    },
    Argument {
        index: usize,
        slot: Option<Descriptor>,
    },
    Lambda {
        runtime: String,
        name: Option<String>,
        scope_id: String,
        source: Option<String>,
    },
}

/// What a closed scope hands to its parent.
#[derive(Debug)]
pub(crate) enum Merged {
    Descriptor(Descriptor),
    Axis(Side, Vec<Descriptor>),
    Argument(Descriptor),
}

/// Entry of the builder's scope arena.
#[derive(Debug)]
pub(crate) struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<usize>,
    pub fragment: Fragment,
}

impl Scope {
    pub fn root() -> Self {
        Self {
            kind: ScopeKind::Root,
            parent: None,
            fragment: Fragment::Root { target: None },
        }
    }

    /// Fails unless the scope holds everything it needs to be closed.
    pub fn ready(&self) -> Result<(), MishmashError> {
        match &self.fragment {
            Fragment::Root { .. } => Err(MishmashError::InvalidState(
                "the root scope cannot be left".to_string(),
            )),
            Fragment::List(_) | Fragment::Function { .. } => Ok(()),
            Fragment::Transformation { left, right } => match (left, right) {
                (Some(_), Some(_)) => Ok(()),
                (None, _) => Err(MishmashError::InvalidState(
                    "transformation has no left axis".to_string(),
                )),
                (_, None) => Err(MishmashError::InvalidState(
                    "transformation has no right axis".to_string(),
                )),
            },
            Fragment::Argument { index, slot } => match slot {
                Some(_) => Ok(()),
                None => Err(MishmashError::InvalidState(format!(
                    "predefined function argument {index} has no descriptor"
                ))),
            },
            Fragment::Lambda {
                scope_id, source, ..
            } => match source {
                Some(_) => Ok(()),
                None => Err(MishmashError::InvalidState(format!(
                    "lambda scope {scope_id} has no source"
                ))),
            },
        }
    }

    pub fn into_merged(self) -> Result<Merged, MishmashError> {
        let merged = match (self.kind, self.fragment) {
            (ScopeKind::Union, Fragment::List(members)) => {
                Merged::Descriptor(Descriptor::Union(members))
            }
            (ScopeKind::Intersection, Fragment::List(members)) => {
                Merged::Descriptor(Descriptor::Intersection(members))
            }
            (ScopeKind::TransformationLeft, Fragment::List(members)) => {
                Merged::Axis(Side::Left, members)
            }
            (ScopeKind::TransformationRight, Fragment::List(members)) => {
                Merged::Axis(Side::Right, members)
            }
            (
                ScopeKind::Transformation,
                Fragment::Transformation {
                    left: Some(left),
                    right: Some(right),
                },
            ) => Merged::Descriptor(Descriptor::Transformation { left, right }),
            (ScopeKind::PredefinedFunction, Fragment::Function { name, arguments }) => {
                Merged::Descriptor(Descriptor::PredefinedFunction { name, arguments })
            }
            (
                ScopeKind::PredefinedFunctionArgument,
                Fragment::Argument {
                    slot: Some(argument),
                    ..
                },
            ) => Merged::Argument(argument),
            (
                ScopeKind::NewLambda,
                Fragment::Lambda {
                    runtime,
                    name,
                    scope_id,
                    source: Some(source),
                },
            ) => Merged::Descriptor(Descriptor::Lambda(LambdaFunction {
                runtime,
                name,
                scope_id,
                source,
            })),
            (kind, _) => {
                return Err(MishmashError::Internal(format!(
                    "{kind} scope closed with an incomplete fragment"
                )));
            }
        };
        Ok(merged)
    }
}

impl Fragment {
    /// True if one more descriptor can be merged here.
    pub fn accepts_descriptor(&self) -> bool {
        match self {
            Self::List(_) => true,
            Self::Root { target } => target.is_none(),
            Self::Argument { slot, .. } => slot.is_none(),
            _ => false,
        }
    }

    pub fn merge(&mut self, merged: Merged) -> Result<(), MishmashError> {
        match (self, merged) {
            (Self::List(members), Merged::Descriptor(descriptor)) => {
                members.push(descriptor);
                Ok(())
            }
            (Self::Root { target }, Merged::Descriptor(Descriptor::Intersection(members))) => {
                if target.is_some() {
                    return Err(MishmashError::InvalidState(
                        "setup target is already set".to_string(),
                    ));
                }
                *target = Some(members);
                Ok(())
            }
            (Self::Argument { index, slot }, Merged::Descriptor(descriptor)) => {
                if slot.is_some() {
                    return Err(MishmashError::InvalidState(format!(
                        "predefined function argument {index} already holds a descriptor"
                    )));
                }
                *slot = Some(descriptor);
                Ok(())
            }
            (Self::Transformation { left, right }, Merged::Axis(side, members)) => {
                let axis = match side {
                    Side::Left => left,
                    Side::Right => right,
                };
                if axis.is_some() {
                    return Err(MishmashError::InvalidState(format!(
                        "{side:?} axis is already set"
                    )));
                }
                *axis = Some(members);
                Ok(())
            }
            (Self::Function { arguments, .. }, Merged::Argument(argument)) => {
                arguments.push(argument);
                Ok(())
            }
            (_, merged) => Err(MishmashError::Internal(format!(
                "cannot merge {merged:?} into this scope"
            ))),
        }
    }
}
