//! Campus Compass query pipeline: free-text search, facet predicates, and
//! facet option extraction over in-memory record collections.
//!
//! One generic engine serves every list view; a view instantiates it with a
//! declarative [`FieldSpec`] list and its search field names. All operations
//! are pure and order-preserving: the pipeline never re-sorts, callers that
//! want "latest first" ask the store for a sorted snapshot up front.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use compass_core::{FieldValue, Record};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sentinel selection value meaning "unconstrained".
pub const ALL: &str = "all";

/// How a facet's selected value is compared against a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Field text equals the selected value exactly.
    Exact,
    /// Field text contains the selected value, case-insensitive.
    Contains,
    /// Any element of an array field contains the selected value,
    /// case-insensitive.
    TagContains,
    /// Numeric field falls inside a `"min-max"` / `"min-"` band.
    Range,
}

/// Declares one filterable facet: the name the UI exposes, the record field
/// it tests, and the comparison mode.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub facet: &'static str,
    pub field: &'static str,
    pub mode: MatchMode,
}

impl FieldSpec {
    pub const fn exact(name: &'static str) -> Self {
        Self { facet: name, field: name, mode: MatchMode::Exact }
    }

    pub const fn contains(name: &'static str) -> Self {
        Self { facet: name, field: name, mode: MatchMode::Contains }
    }

    pub const fn tags(name: &'static str) -> Self {
        Self { facet: name, field: name, mode: MatchMode::TagContains }
    }

    pub const fn range(facet: &'static str, field: &'static str) -> Self {
        Self { facet, field, mode: MatchMode::Range }
    }
}

/// Current facet choices for one view. A missing key is equivalent to the
/// [`ALL`] sentinel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    facets: FxHashMap<String, String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, facet: &str) -> &str {
        self.facets.get(facet).map(String::as_str).unwrap_or(ALL)
    }

    pub fn set(&mut self, facet: impl Into<String>, value: impl Into<String>) {
        self.facets.insert(facet.into(), value.into());
    }

    /// Put one facet back to unconstrained.
    pub fn clear(&mut self, facet: &str) {
        self.facets.remove(facet);
    }

    /// A new selection with every known facet back at [`ALL`].
    pub fn reset(&self) -> Selection {
        let facets = self.facets.keys().map(|k| (k.clone(), ALL.to_string())).collect();
        Selection { facets }
    }

    /// True iff at least one facet differs from [`ALL`].
    pub fn has_active_filters(&self) -> bool {
        self.facets.values().any(|v| v != ALL)
    }

    /// Facets currently constrained, for "active filters" chips.
    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.facets
            .iter()
            .filter(|(_, v)| v.as_str() != ALL)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Distinct non-empty values of `field` across `records`, for facet option
/// lists. Array-valued fields are flattened one level. Empty input yields an
/// empty set.
pub fn distinct_values<R: Record>(records: &[R], field: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for record in records {
        match record.field(field) {
            Some(FieldValue::Text(t)) if !t.is_empty() => {
                out.insert(t.to_string());
            }
            Some(FieldValue::Tags(tags)) => {
                for t in tags {
                    if !t.is_empty() {
                        out.insert(t.clone());
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Parse a `"min-max"` / `"min-"` range value. An absent max bound means
/// open-ended above min. Unparsable bounds degrade to 0 rather than erroring.
pub fn parse_range(value: &str) -> (f64, Option<f64>) {
    let (lo, hi) = match value.split_once('-') {
        Some((lo, hi)) => (lo, Some(hi)),
        None => (value, None),
    };
    let min = lo.trim().parse::<f64>().unwrap_or(0.0);
    let max = match hi {
        Some(h) if !h.trim().is_empty() => Some(h.trim().parse::<f64>().unwrap_or(0.0)),
        _ => None,
    };
    (min, max)
}

/// Does `record` satisfy one facet constraint? The [`ALL`] sentinel always
/// matches; a record missing the tested field never does.
pub fn matches_facet<R: Record>(record: &R, spec: &FieldSpec, value: &str) -> bool {
    if value == ALL {
        return true;
    }
    let Some(field) = record.field(spec.field) else {
        return false;
    };
    match (spec.mode, field) {
        (MatchMode::Exact, FieldValue::Text(t)) => t == value,
        (MatchMode::Contains, FieldValue::Text(t)) => {
            t.to_lowercase().contains(&value.to_lowercase())
        }
        (MatchMode::TagContains, FieldValue::Tags(tags)) => {
            let needle = value.to_lowercase();
            tags.iter().any(|t| t.to_lowercase().contains(&needle))
        }
        (MatchMode::Range, FieldValue::Number(n)) => {
            let (min, max) = parse_range(value);
            match max {
                Some(max) => n >= min && n <= max,
                None => n >= min,
            }
        }
        _ => false,
    }
}

/// AND-composed predicate over every facet in `specs` for the given
/// selection. Facets left at [`ALL`] impose no constraint.
pub fn build_predicate<'a, R: Record>(
    selection: &'a Selection,
    specs: &'a [FieldSpec],
) -> impl Fn(&R) -> bool + 'a {
    move |record| {
        specs
            .iter()
            .all(|spec| matches_facet(record, spec, selection.get(spec.facet)))
    }
}

/// Case-insensitive free-text match across the named fields, OR semantics.
/// An empty term matches everything; a field the record lacks is simply a
/// non-match for that field.
pub fn matches_search<R: Record>(record: &R, term: &str, fields: &[&str]) -> bool {
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    fields.iter().any(|name| match record.field(name) {
        Some(FieldValue::Text(t)) => t.to_lowercase().contains(&needle),
        Some(FieldValue::Tags(tags)) => tags.iter().any(|t| t.to_lowercase().contains(&needle)),
        _ => false,
    })
}

/// A view's query configuration: which fields free text searches and which
/// facets can constrain results.
#[derive(Debug, Clone, Copy)]
pub struct ViewQuery {
    pub search_fields: &'static [&'static str],
    pub facets: &'static [FieldSpec],
}

impl ViewQuery {
    pub const fn new(
        search_fields: &'static [&'static str],
        facets: &'static [FieldSpec],
    ) -> Self {
        Self { search_fields, facets }
    }

    /// Single pass over `records` in input order: keep a record iff the
    /// search term and every active facet accept it. Pure and idempotent.
    pub fn run<R: Record + Clone>(
        &self,
        records: &[R],
        term: &str,
        selection: &Selection,
    ) -> Vec<R> {
        let predicate = build_predicate(selection, self.facets);
        let out: Vec<R> = records
            .iter()
            .filter(|r| matches_search(*r, term, self.search_fields) && predicate(*r))
            .cloned()
            .collect();
        debug!(total = records.len(), kept = out.len(), term, "query evaluated");
        out
    }

    /// Facet option set for one facet, derived from the record collection.
    pub fn options<R: Record>(&self, records: &[R], facet: &str) -> BTreeSet<String> {
        match self.facets.iter().find(|s| s.facet == facet) {
            Some(spec) => distinct_values(records, spec.field),
            None => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use compass_core::{Listing, Mentor, Post};
    use uuid::Uuid;

    const POST_QUERY: ViewQuery = ViewQuery::new(
        &["title", "content", "subject"],
        &[
            FieldSpec::exact("kind"),
            FieldSpec::exact("subject"),
            FieldSpec::exact("status"),
        ],
    );

    const LISTING_QUERY: ViewQuery = ViewQuery::new(
        &["title", "description", "subject"],
        &[
            FieldSpec::exact("category"),
            FieldSpec::exact("condition"),
            FieldSpec::range("price_range", "price"),
        ],
    );

    const MENTOR_QUERY: ViewQuery = ViewQuery::new(
        &["full_name", "major", "bio", "skills"],
        &[
            FieldSpec::exact("year"),
            FieldSpec::contains("major"),
            FieldSpec::tags("skills"),
        ],
    );

    fn uid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    fn post(n: u8, title: &str, subject: Option<&str>, kind: &str) -> Post {
        Post {
            id: uid(n),
            title: title.to_string(),
            content: String::new(),
            kind: kind.parse().expect("known post kind"),
            subject: subject.map(|s| s.to_string()),
            course_code: None,
            tags: smallvec::SmallVec::new(),
            is_resolved: false,
            upvotes: 0,
            created_date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, n as u32).unwrap(),
        }
    }

    fn listing(n: u8, title: &str, price: f64) -> Listing {
        Listing {
            id: uid(n),
            title: title.to_string(),
            description: String::new(),
            category: "textbook".parse().unwrap(),
            kind: "sell".parse().unwrap(),
            condition: "good".parse().unwrap(),
            price,
            subject: None,
            created_date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, n as u32).unwrap(),
        }
    }

    fn mentor(n: u8, name: &str, major: &str, year: &str, skills: &[&str]) -> Mentor {
        Mentor {
            id: uid(n),
            full_name: name.to_string(),
            major: major.to_string(),
            year: year.to_string(),
            bio: String::new(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn distinct_values_skips_missing_and_flattens_tags() {
        let posts = vec![
            post(1, "a", Some("Math"), "question"),
            post(2, "b", None, "question"),
            post(3, "c", Some("CS"), "discussion"),
            post(4, "d", Some("Math"), "discussion"),
        ];
        let subjects = distinct_values(&posts, "subject");
        assert_eq!(subjects.len(), 2);
        assert!(subjects.contains("Math") && subjects.contains("CS"));
        assert!(subjects.iter().all(|s| !s.is_empty()));

        let mentors = vec![
            mentor(1, "A", "CS", "junior", &["Python", "ML"]),
            mentor(2, "B", "IT", "senior", &["Python", "React"]),
        ];
        let skills = distinct_values(&mentors, "skills");
        assert_eq!(skills.len(), 3);
    }

    #[test]
    fn empty_term_and_unconstrained_selection_return_input_unchanged() {
        let posts = vec![
            post(1, "first", Some("Math"), "question"),
            post(2, "second", None, "discussion"),
            post(3, "third", Some("CS"), "announcement"),
        ];
        let mut selection = Selection::new();
        selection.set("kind", ALL);
        let out = POST_QUERY.run(&posts, "", &selection);
        assert_eq!(out.len(), posts.len());
        for (a, b) in out.iter().zip(posts.iter()) {
            assert_eq!(a.id, b.id);
        }
    }

    #[test]
    fn query_is_a_fixed_point() {
        let posts = vec![
            post(1, "calc help", Some("Math"), "question"),
            post(2, "intro", Some("CS"), "discussion"),
            post(3, "more calc", Some("Math"), "question"),
        ];
        let mut selection = Selection::new();
        selection.set("subject", "Math");
        let once = POST_QUERY.run(&posts, "calc", &selection);
        let twice = POST_QUERY.run(&once, "calc", &selection);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.id, b.id);
        }
    }

    #[test]
    fn search_is_case_insensitive() {
        let posts = vec![
            post(1, "MATH midterm", None, "question"),
            post(2, "biology lab", None, "question"),
        ];
        let selection = Selection::new();
        let upper = POST_QUERY.run(&posts, "MATH", &selection);
        let lower = POST_QUERY.run(&posts, "math", &selection);
        assert_eq!(upper.len(), 1);
        assert_eq!(upper[0].id, lower[0].id);
    }

    #[test]
    fn price_range_keeps_the_inclusive_band() {
        let listings = vec![
            listing(1, "free", 0.0),
            listing(2, "cheap", 50.0),
            listing(3, "mid", 150.0),
            listing(4, "dear", 300.0),
        ];
        let mut selection = Selection::new();
        selection.set("price_range", "100-200");
        let out = LISTING_QUERY.run(&listings, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].price, 150.0);
    }

    #[test]
    fn open_ended_range_matches_everything_above_min() {
        let listings = vec![listing(1, "a", 50.0), listing(2, "b", 300.0)];
        let mut selection = Selection::new();
        selection.set("price_range", "200-");
        let out = LISTING_QUERY.run(&listings, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].price, 300.0);
    }

    #[test]
    fn unparsable_range_bound_degrades_to_zero() {
        let listings = vec![listing(1, "a", 50.0), listing(2, "b", 300.0)];
        let mut selection = Selection::new();
        selection.set("price_range", "abc-200");
        // min parses to 0, so everything priced up to 200 slips through
        let out = LISTING_QUERY.run(&listings, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].price, 50.0);
    }

    #[test]
    fn skill_search_matches_substring_inside_tags() {
        let mentors = vec![
            mentor(1, "Alice", "CS", "junior", &["Python", "ML"]),
            mentor(2, "Bob", "IT", "senior", &["Java"]),
        ];
        let selection = Selection::new();
        let out = MENTOR_QUERY.run(&mentors, "pyth", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].full_name, "Alice");
    }

    #[test]
    fn skill_facet_uses_tag_contains() {
        let mentors = vec![
            mentor(1, "Alice", "Computer Science", "junior", &["Machine Learning"]),
            mentor(2, "Bob", "IT", "senior", &["Java"]),
        ];
        let mut selection = Selection::new();
        selection.set("skills", "machine");
        let out = MENTOR_QUERY.run(&mentors, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].full_name, "Alice");
    }

    #[test]
    fn major_facet_is_substring_case_insensitive() {
        let mentors = vec![
            mentor(1, "Alice", "Computer Science", "junior", &[]),
            mentor(2, "Bob", "Electronics and Communication", "senior", &[]),
        ];
        let mut selection = Selection::new();
        selection.set("major", "computer");
        let out = MENTOR_QUERY.run(&mentors, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].full_name, "Alice");
    }

    #[test]
    fn reset_clears_every_facet() {
        let mut selection = Selection::new();
        selection.set("kind", "question");
        selection.set("subject", "Math");
        assert!(selection.has_active_filters());
        assert_eq!(selection.active().count(), 2);
        let reset = selection.reset();
        assert!(!reset.has_active_filters());
        assert_eq!(reset.active().count(), 0);
        // known facets are kept, just unconstrained
        assert_eq!(reset.get("kind"), ALL);
        assert_eq!(reset.get("subject"), ALL);
    }

    #[test]
    fn absent_facet_key_is_unconstrained() {
        let selection = Selection::new();
        assert_eq!(selection.get("anything"), ALL);
        assert!(!selection.has_active_filters());
    }

    #[test]
    fn facets_and_together() {
        let posts = vec![
            post(1, "calc help", Some("Math"), "question"),
            post(2, "calc notes", Some("Math"), "discussion"),
            post(3, "cs help", Some("CS"), "question"),
        ];
        let mut selection = Selection::new();
        selection.set("subject", "Math");
        selection.set("kind", "question");
        let out = POST_QUERY.run(&posts, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, uid(1));
    }

    #[test]
    fn status_facet_splits_resolved_and_unresolved() {
        let mut resolved = post(1, "done", None, "question");
        resolved.is_resolved = true;
        let posts = vec![resolved, post(2, "open", None, "question")];
        let mut selection = Selection::new();
        selection.set("status", "resolved");
        let out = POST_QUERY.run(&posts, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, uid(1));

        selection.set("status", "unresolved");
        let out = POST_QUERY.run(&posts, "", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, uid(2));
    }

    #[test]
    fn search_term_with_unconstrained_facets_end_to_end() {
        let posts = vec![
            post(1, "Calc help", Some("Math"), "question"),
            post(2, "Intro CS", Some("CS"), "discussion"),
        ];
        let mut selection = Selection::new();
        selection.set("kind", ALL);
        selection.set("subject", ALL);
        let out = POST_QUERY.run(&posts, "help", &selection);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Calc help");
    }

    #[test]
    fn options_are_scoped_to_known_facets() {
        let posts = vec![post(1, "a", Some("Math"), "question")];
        assert_eq!(POST_QUERY.options(&posts, "subject").len(), 1);
        assert!(POST_QUERY.options(&posts, "nope").is_empty());
    }
}
