//! Campus Compass store client: the collection/auth contract every backend
//! satisfies, plus the in-process implementation backing tests and the CLI.
//!
//! The query engine never talks to a store; views fetch a snapshot through
//! [`Collection`] and hand it to the engine. Remote implementations can slot
//! in later behind the same traits.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use compass_core::{Entity, FieldErrors, FieldValue, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Store-boundary errors suitable for surfacing to a frontend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One remote entity collection, the shape of `entities.<Kind>` on the
/// backing service.
#[async_trait]
pub trait Collection<T: Entity>: Send + Sync {
    /// Fetch records. `sort` names a field, `-` prefixed for descending;
    /// an empty spec keeps store order. `limit` caps the result length.
    async fn list(&self, sort: &str, limit: Option<usize>) -> StoreResult<Vec<T>>;

    /// Validate and persist a draft; the stored record comes back with its
    /// generated identifier and creation timestamp.
    async fn create(&self, draft: T::Draft) -> StoreResult<T>;
}

/// The signed-in account, as reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
}

#[async_trait]
pub trait Auth: Send + Sync {
    async fn current_user(&self) -> StoreResult<UserProfile>;
    async fn logout(&self) -> StoreResult<()>;
}

fn compare_field<T: Record>(a: &T, b: &T, field: &str) -> Ordering {
    use FieldValue::*;
    match (a.field(field), b.field(field)) {
        (Some(Time(x)), Some(Time(y))) => x.cmp(&y),
        (Some(Number(x)), Some(Number(y))) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(Text(x)), Some(Text(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Stable in-place sort by a `-`-prefixed sort spec. Records missing the
/// field (and ties) keep their relative order.
pub fn apply_sort<T: Record>(items: &mut [T], sort: &str) {
    if sort.is_empty() {
        return;
    }
    let (field, descending) = match sort.strip_prefix('-') {
        Some(f) => (f, true),
        None => (sort, false),
    };
    items.sort_by(|a, b| {
        let ord = compare_field(a, b, field);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

/// In-process collection used by tests and the CLI. Insertion order is the
/// store order; `list` works over a cloned snapshot.
pub struct MemoryStore<T> {
    records: Mutex<Vec<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self { records: Mutex::new(Vec::new()) }
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<T>) -> Self {
        Self { records: Mutex::new(records) }
    }
}

impl<T: Entity + DeserializeOwned> MemoryStore<T> {
    /// Seed a store from a JSON array of full records.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let records: Vec<T> = serde_json::from_str(raw)?;
        debug!(kind = T::KIND, count = records.len(), "store seeded from json");
        Ok(Self::with_records(records))
    }
}

impl<T> MemoryStore<T> {
    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Vec<T>>> {
        self.records
            .lock()
            .map_err(|_| StoreError::Internal("store mutex poisoned".into()))
    }
}

#[async_trait]
impl<T: Entity + Record> Collection<T> for MemoryStore<T> {
    async fn list(&self, sort: &str, limit: Option<usize>) -> StoreResult<Vec<T>> {
        let mut items = self.lock()?.clone();
        apply_sort(&mut items, sort);
        if let Some(cap) = limit {
            items.truncate(cap);
        }
        debug!(kind = T::KIND, count = items.len(), sort, "list served");
        Ok(items)
    }

    async fn create(&self, draft: T::Draft) -> StoreResult<T> {
        let errors = T::validate(&draft);
        if !errors.is_empty() {
            warn!(kind = T::KIND, fields = errors.len(), "create rejected by validation");
            return Err(StoreError::Validation(errors));
        }
        let record = T::from_draft(draft, Uuid::new_v4(), Utc::now());
        let mut guard = self.lock()?;
        guard.push(record.clone());
        info!(kind = T::KIND, id = %record.id(), total = guard.len(), "record created");
        Ok(record)
    }
}

/// Fixed-identity auth used by tests and the CLI; `None` behaves like a
/// signed-out session.
pub struct StaticAuth {
    user: Option<UserProfile>,
}

impl StaticAuth {
    pub fn signed_in(email: impl Into<String>) -> Self {
        Self { user: Some(UserProfile { email: email.into() }) }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl Auth for StaticAuth {
    async fn current_user(&self) -> StoreResult<UserProfile> {
        self.user
            .clone()
            .ok_or_else(|| StoreError::NotFound("no signed-in user".into()))
    }

    async fn logout(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Outcome of the campus email-domain gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Granted(UserProfile),
    Denied(UserProfile),
    /// No signed-in user; the remote service owns the login redirect, so
    /// callers let the request through.
    Unauthenticated,
}

/// Restricts access to accounts under one campus email domain.
pub struct AccessGate {
    suffix: String,
}

impl AccessGate {
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim_start_matches('@').to_lowercase();
        Self { suffix: format!("@{domain}") }
    }

    pub async fn check(&self, auth: &dyn Auth) -> GateDecision {
        match auth.current_user().await {
            Ok(user) => {
                if user.email.to_lowercase().ends_with(&self.suffix) {
                    GateDecision::Granted(user)
                } else {
                    warn!(email = %user.email, required = %self.suffix, "email outside campus domain");
                    GateDecision::Denied(user)
                }
            }
            Err(e) => {
                debug!(error = %e, "no signed-in user; deferring to remote login");
                GateDecision::Unauthenticated
            }
        }
    }
}
