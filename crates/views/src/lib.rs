//! Campus Compass list views: each view owns an immutable record snapshot,
//! its ephemeral filter state, and the query configuration it hands to the
//! engine. Loading is explicit three-state; a failed refresh never discards
//! records a view already has.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use compass_client::{Collection, StoreResult};
use compass_core::{Entity, Listing, Mentor, Post, Record};
use compass_query::{FieldSpec, Selection, ViewQuery};
use tracing::{info, warn};

pub mod dashboard;

pub use dashboard::{Activity, ActivitySource, Dashboard, QuickStats};

/// Marketplace listings: free text over title/description/subject, exact
/// facets plus the price band.
pub const LISTING_QUERY: ViewQuery = ViewQuery::new(
    &["title", "description", "subject"],
    &[
        FieldSpec::exact("category"),
        FieldSpec::exact("kind"),
        FieldSpec::exact("condition"),
        FieldSpec::range("price_range", "price"),
    ],
);

/// Forum posts: the `status` facet tests the derived resolved/unresolved
/// field.
pub const POST_QUERY: ViewQuery = ViewQuery::new(
    &["title", "content", "subject"],
    &[
        FieldSpec::exact("kind"),
        FieldSpec::exact("subject"),
        FieldSpec::exact("status"),
    ],
);

/// Mentors: majors filter by substring, skills by array containment.
pub const MENTOR_QUERY: ViewQuery = ViewQuery::new(
    &["full_name", "major", "bio", "skills"],
    &[
        FieldSpec::exact("year"),
        FieldSpec::contains("major"),
        FieldSpec::tags("skills"),
    ],
);

/// Whether a view has records yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    NotLoaded,
    Loaded(Vec<T>),
    Failed,
}

/// One list view: snapshot + search term + facet selection.
pub struct ListView<T> {
    query: ViewQuery,
    state: LoadState<T>,
    selection: Selection,
    search: String,
}

impl<T: Entity + Record> ListView<T> {
    pub fn new(query: ViewQuery) -> Self {
        Self {
            query,
            state: LoadState::NotLoaded,
            selection: Selection::new(),
            search: String::new(),
        }
    }

    pub fn load_state(&self) -> &LoadState<T> {
        &self.state
    }

    /// The raw snapshot; empty until a load succeeds.
    pub fn records(&self) -> &[T] {
        match &self.state {
            LoadState::Loaded(items) => items,
            _ => &[],
        }
    }

    /// Fetch a fresh latest-first snapshot. On failure the previous
    /// snapshot (if any) is kept; a view that never loaded moves to
    /// `Failed`.
    pub async fn load(&mut self, store: &dyn Collection<T>) {
        match store.list("-created_date", None).await {
            Ok(items) => {
                info!(kind = T::KIND, count = items.len(), "view loaded");
                self.state = LoadState::Loaded(items);
            }
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "load failed; keeping previous records");
                if !matches!(self.state, LoadState::Loaded(_)) {
                    self.state = LoadState::Failed;
                }
            }
        }
    }

    /// Create a record, then refresh the snapshot. Validation errors come
    /// back without touching the store or the snapshot.
    pub async fn submit(&mut self, store: &dyn Collection<T>, draft: T::Draft) -> StoreResult<T> {
        let created = store.create(draft).await?;
        self.load(store).await;
        Ok(created)
    }

    pub fn search_term(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_facet(&mut self, facet: impl Into<String>, value: impl Into<String>) {
        self.selection.set(facet, value);
    }

    pub fn clear_facet(&mut self, facet: &str) {
        self.selection.clear(facet);
    }

    /// The explicit reset action: every facet back to "all" and the search
    /// box emptied, returning the view to its idle state.
    pub fn reset_filters(&mut self) {
        self.selection = self.selection.reset();
        self.search.clear();
    }

    /// True while any facet or a non-empty search term constrains results.
    pub fn is_filtered(&self) -> bool {
        self.selection.has_active_filters() || !self.search.is_empty()
    }

    /// Run the query pipeline over the current snapshot.
    pub fn visible(&self) -> Vec<T> {
        self.query.run(self.records(), &self.search, &self.selection)
    }

    /// Facet options derived from the current snapshot.
    pub fn facet_options(&self, facet: &str) -> BTreeSet<String> {
        self.query.options(self.records(), facet)
    }
}

pub fn listings_view() -> ListView<Listing> {
    ListView::new(LISTING_QUERY)
}

pub fn posts_view() -> ListView<Post> {
    ListView::new(POST_QUERY)
}

pub fn mentors_view() -> ListView<Mentor> {
    ListView::new(MENTOR_QUERY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use compass_client::{MemoryStore, StoreError};
    use compass_core::{PostDraft, PostKind};
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn post(n: u8, title: &str, subject: Option<&str>) -> Post {
        Post {
            id: Uuid::from_bytes([n; 16]),
            title: title.to_string(),
            content: "body".to_string(),
            kind: PostKind::Question,
            subject: subject.map(|s| s.to_string()),
            course_code: None,
            tags: smallvec::SmallVec::new(),
            is_resolved: false,
            upvotes: 0,
            created_date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, n as u32).unwrap(),
        }
    }

    /// Store that can be flipped into a failing mode.
    struct FlakyStore {
        inner: MemoryStore<Post>,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new(records: Vec<Post>) -> Self {
            Self { inner: MemoryStore::with_records(records), failing: AtomicBool::new(false) }
        }

        fn fail_next(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Collection<Post> for FlakyStore {
        async fn list(&self, sort: &str, limit: Option<usize>) -> compass_client::StoreResult<Vec<Post>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Internal("connection reset".into()));
            }
            self.inner.list(sort, limit).await
        }

        async fn create(&self, draft: PostDraft) -> compass_client::StoreResult<Post> {
            self.inner.create(draft).await
        }
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_snapshot() {
        let store = FlakyStore::new(vec![post(1, "first", None)]);
        let mut view = posts_view();
        view.load(&store).await;
        assert_eq!(view.records().len(), 1);

        store.fail_next();
        view.load(&store).await;
        assert!(matches!(view.load_state(), LoadState::Loaded(_)));
        assert_eq!(view.records().len(), 1);
    }

    #[tokio::test]
    async fn first_load_failure_is_explicit() {
        let store = FlakyStore::new(vec![]);
        store.fail_next();
        let mut view = posts_view();
        view.load(&store).await;
        assert_eq!(*view.load_state(), LoadState::Failed);
        assert!(view.records().is_empty());
        assert!(view.visible().is_empty());
    }

    #[tokio::test]
    async fn filter_state_machine_idle_and_filtered() {
        let mut view = posts_view();
        assert!(!view.is_filtered());

        view.set_search("calc");
        assert!(view.is_filtered());
        view.set_search("");
        assert!(!view.is_filtered());

        view.set_facet("subject", "Math");
        assert!(view.is_filtered());
        view.clear_facet("subject");
        assert!(!view.is_filtered());

        view.set_search("calc");
        view.set_facet("subject", "Math");
        view.reset_filters();
        assert!(!view.is_filtered());
        assert_eq!(view.search_term(), "");
    }

    #[tokio::test]
    async fn visible_applies_search_and_facets_in_order() {
        let store = FlakyStore::new(vec![
            post(1, "calc help", Some("Math")),
            post(3, "more calc", Some("CS")),
            post(2, "essay tips", Some("English")),
        ]);
        let mut view = posts_view();
        view.load(&store).await;
        // snapshot arrives latest-first
        assert_eq!(view.records()[0].title, "more calc");

        view.set_search("calc");
        view.set_facet("subject", "Math");
        let visible = view.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "calc help");
    }

    #[tokio::test]
    async fn submit_refreshes_the_snapshot() {
        let store = FlakyStore::new(vec![]);
        let mut view = posts_view();
        view.load(&store).await;

        let draft = PostDraft {
            title: "New question".into(),
            content: "body".into(),
            kind: Some(PostKind::Question),
            ..Default::default()
        };
        let created = view.submit(&store, draft).await.unwrap();
        assert_eq!(view.records().len(), 1);
        assert_eq!(view.records()[0].id, created.id);
    }

    #[tokio::test]
    async fn invalid_draft_leaves_snapshot_untouched() {
        let store = FlakyStore::new(vec![post(1, "only", None)]);
        let mut view = posts_view();
        view.load(&store).await;

        let err = view.submit(&store, PostDraft::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(view.records().len(), 1);
    }

    #[tokio::test]
    async fn facet_options_follow_the_snapshot() {
        let store = FlakyStore::new(vec![
            post(1, "a", Some("Math")),
            post(2, "b", Some("CS")),
            post(3, "c", None),
        ]);
        let mut view = posts_view();
        view.load(&store).await;
        let subjects = view.facet_options("subject");
        assert_eq!(subjects.len(), 2);
        assert!(subjects.contains("Math") && subjects.contains("CS"));
    }
}
