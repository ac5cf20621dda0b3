//! Interactive input seam.

use futures_util::future::BoxFuture;
use serde_json::Value;

use cadence_types::step::InputSpec;

use crate::workflow::error::StepError;

/// Answer to an input request.
#[derive(Debug, Clone, PartialEq)]
pub enum InputAnswer {
    Value(Value),
    /// No answer can be obtained now; the session should wait for an
    /// external event.
    Deferred,
}

/// Obtains answers for input steps.
pub trait InputProvider: Send + Sync {
    fn ask<'a>(&'a self, spec: &'a InputSpec) -> BoxFuture<'a, Result<InputAnswer, StepError>>;
}

/// Non-interactive provider: uses the declared default when there is one,
/// otherwise defers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredInput;

impl InputProvider for DeferredInput {
    fn ask<'a>(&'a self, spec: &'a InputSpec) -> BoxFuture<'a, Result<InputAnswer, StepError>> {
        Box::pin(async move {
            Ok(match &spec.default {
                Some(value) => InputAnswer::Value(value.clone()),
                None => InputAnswer::Deferred,
            })
        })
    }
}
