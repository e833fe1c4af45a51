//! Error taxonomy for the sync engine.
//!
//! Entity-scoped errors ([`IdentityError`], [`ExtractionWarning`],
//! [`MotionSampleError`], [`TranslateError`]) are caught at the translator
//! boundary and collected into the [`crate::sync::SyncReport`]. Pass-scoped
//! errors ([`SyncError`]) abort the running `sync_frame` call.

use serde::Serialize;
use thiserror::Error;

use crate::{
    retained::Detail,
    utils::allocator::ObjectId,
};

/// Failures reported by the host scene while evaluating an object.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("object {0:?} does not exist")]
    MissingObject(ObjectId),
    #[error("object {0:?} has no mesh data")]
    NoMeshData(ObjectId),
    #[error("evaluation of {name} failed: {reason}")]
    Evaluation { name: String, reason: String },
}

/// The entity has no resolvable owner or name. Aborts that entity only.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum IdentityError {
    #[error("object {0:?} is not in the host scene")]
    MissingObject(ObjectId),
    #[error("parent {parent:?} of {object} is not in the host scene")]
    MissingParent { object: String, parent: ObjectId },
    #[error("object {0:?} has no name")]
    Unnamed(ObjectId),
    #[error("{0} resolves to an empty name after sanitizing")]
    EmptyName(String),
    #[error("{key} of {object:?} is already taken by another entity this pass")]
    DuplicateInstance { key: String, object: ObjectId },
}

/// Non-fatal extraction problems; the attribute is skipped and export continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ExtractionWarning {
    #[error("{mesh}: primvar {primvar} has {len} values, expected one of {expected:?}")]
    CardinalityMismatch {
        mesh: String,
        primvar: String,
        len: usize,
        expected: Vec<(Detail, usize)>,
    },
    #[error("{mesh}: requested layer {layer} does not exist")]
    MissingLayer { mesh: String, layer: String },
    #[error("{mesh}: tangents could not be computed: {reason}")]
    TangentFailure { mesh: String, reason: String },
    #[error("{mesh}: face {face} references material slot {index}, clamped to {clamped}")]
    MaterialIndexOutOfRange {
        mesh: String,
        face: usize,
        index: u32,
        clamped: u32,
    },
}

/// A motion sample could not be captured; that entity's motion cache is cleared.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("motion sample {segment} (offset {offset}) of {entity} failed: {reason}")]
pub struct MotionSampleError {
    pub entity: String,
    pub segment: usize,
    pub offset: f32,
    pub reason: String,
}

/// The prototype cache is in an invalid state. Aborts the pass.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum CacheConsistencyError {
    #[error("release of {instance} from unknown prototype {prototype}")]
    UnknownPrototype { prototype: String, instance: String },
    #[error("instance count underflow: {instance} does not reference {prototype}")]
    Underflow { prototype: String, instance: String },
    #[error("prototype {0} is cached with no referencing instance")]
    Unreferenced(String),
    #[error("instance {instance} points at missing prototype {prototype}")]
    DanglingInstance { prototype: String, instance: String },
    #[error("prototype {prototype} still counts removed referrer {referrer}")]
    StaleReferrer { prototype: String, referrer: String },
}

/// Entity-scoped translator failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{name}: translator for {expected} received a {found} entity")]
    KindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Pass-scoped failure returned from `sync_frame`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("another sync pass is already running on this context")]
    PassInProgress,
    #[error("sync pass cancelled")]
    Cancelled,
    #[error(transparent)]
    Cache(#[from] CacheConsistencyError),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_errors_convert_into_pass_errors() {
        let err: SyncError = CacheConsistencyError::Unreferenced("Cube-MESH".into()).into();
        assert!(matches!(err, SyncError::Cache(_)));
        assert!(err.to_string().contains("Cube-MESH"));
    }

    #[test]
    fn identity_errors_wrap_into_translate_errors() {
        let err: TranslateError = IdentityError::Unnamed(ObjectId::from_index(3)).into();
        assert!(matches!(err, TranslateError::Identity(_)));
    }
}
