//! Marks response paths that were settled by a continuation.
//!
//! Marks live in the execution scope, so they disappear with the execution
//! that set them.

use gqlc_runtime::{ExecutionScope, PathSegment};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

#[derive(Default)]
struct Marks(Mutex<FxHashSet<Vec<PathSegment>>>);

/// Marks `path` and everything beneath it as settled.
pub fn mark(scope: &ExecutionScope, path: &[PathSegment]) {
    scope
        .extension_or_insert_with(Marks::default)
        .0
        .lock()
        .insert(path.to_vec());
}

/// Returns true if `path` or one of its ancestors is marked.
pub fn is_marked(scope: &ExecutionScope, path: &[PathSegment]) -> bool {
    let Some(marks) = scope.extension::<Marks>() else {
        return false;
    };
    let marks = marks.0.lock();
    (1..=path.len()).any(|len| marks.contains(&path[..len]))
}
