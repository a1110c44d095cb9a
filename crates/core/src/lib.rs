//! Campus Compass core types: the entity model and generic field access.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

mod entities;

pub use entities::{
    Category, Condition, Listing, ListingDraft, ListingKind, Mentor, MentorDraft,
    MentorshipRequest, Post, PostDraft, PostKind, RequestDraft,
};

/// Field-keyed validation errors, as surfaced to forms. Empty means valid.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// One field of a record, as seen by the query engine.
///
/// Entities expose their fields through this borrowed view so the engine
/// never needs to know concrete record shapes. Derived fields are allowed
/// (e.g. a post's `status` is rendered from its `is_resolved` flag).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Flag(bool),
    Tags(&'a [String]),
    Time(DateTime<Utc>),
}

/// Uniform field access over heterogeneous records.
pub trait Record {
    /// Look up a field by name. `None` means the record does not carry it.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

/// A storable entity kind: knows how to validate its draft and how to
/// materialize a stored record from one.
pub trait Entity: Clone + Send + Sync + 'static {
    type Draft: Send + Sync;

    /// Stable lowercase kind name used in logs.
    const KIND: &'static str;

    fn validate(draft: &Self::Draft) -> FieldErrors;

    /// Build the stored record from a validated draft plus the identifier
    /// and creation timestamp assigned by the store.
    fn from_draft(draft: Self::Draft, id: Uuid, created: DateTime<Utc>) -> Self;

    fn id(&self) -> Uuid;
}

/// Error for parsing closed vocabularies (categories, kinds, conditions).
#[derive(Debug, thiserror::Error)]
#[error("unknown {what}: {value}")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

pub mod prelude {
    pub use super::{Entity, FieldErrors, FieldValue, Record};
    pub use super::{Listing, Mentor, MentorshipRequest, Post};
}
