//! Moves a subquery's errors into its data.
//!
//! A deferred subtree's errors are reported against paths inside the
//! subquery. Each error is embedded at its path in the data, so the outer
//! execution raises it again at the position the failing field occupies in
//! the original query.

use gqlc_runtime::{FieldError, PathSegment, Response};
use serde_json::Value;

/// Unwraps the lookup field of a wrapped subquery response.
pub fn unwrap_target(mut response: Response, field: &str) -> Response {
    if let Some(Value::Object(data)) = &mut response.data {
        if let Some(inner) = data.remove(field) {
            response.data = Some(inner);
        }
    }
    if let Some(errors) = &mut response.errors {
        for error in errors {
            if let Some(path) = &mut error.path {
                if matches!(path.first(), Some(PathSegment::Field(name)) if name == field) {
                    path.remove(0);
                }
            }
        }
    }
    response
}

/// Returns the response data with its errors embedded.
///
/// If the data is null and there are errors, the first error is returned
/// instead, to be reported as the continuation field's own error.
pub fn interleave_errors(response: Response) -> Result<Value, FieldError> {
    let errors = response.errors.unwrap_or_default();
    let mut data = match response.data {
        Some(Value::Null) | None => {
            return match errors.into_iter().next() {
                Some(mut first) => {
                    first.path = None;
                    Err(first)
                }
                None => Ok(Value::Null),
            };
        }
        Some(data) => data,
    };
    for error in errors {
        embed_at_path(&mut data, error);
    }
    Ok(data)
}

/// Places an error at its path, or at the first null on the way there.
fn embed_at_path(data: &mut Value, mut error: FieldError) {
    let Some(path) = error.path.take().filter(|path| !path.is_empty()) else {
        tracing::warn!(message = %error.message, "dropping continuation error without a path");
        return;
    };
    let marker = error.embed();

    let mut target = data;
    for (i, segment) in path.iter().enumerate() {
        let slot = match (segment, target) {
            (PathSegment::Field(key), Value::Object(map)) => map.get_mut(key),
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        };
        let Some(slot) = slot else {
            tracing::warn!(
                message = %error.message,
                ?path,
                "dropping continuation error whose path is not in the data"
            );
            return;
        };
        if i + 1 == path.len() || slot.is_null() {
            *slot = marker;
            return;
        }
        target = slot;
    }
}
