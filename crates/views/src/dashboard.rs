//! Dashboard aggregations: quick stats, the merged recent-activity feed,
//! trending topics, and featured listings.

use chrono::{DateTime, Utc};
use compass_client::{Collection, StoreResult};
use compass_core::{Listing, MentorshipRequest, Post};
use serde::Serialize;
use tracing::info;

/// Counts shown on the stat tiles, taken from capped list calls.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuickStats {
    pub listings: usize,
    pub posts: usize,
    pub mentorship_requests: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Listing,
    Post,
}

/// One row of the recent-activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub source: ActivitySource,
    pub title: String,
    pub snippet: String,
    pub time: DateTime<Utc>,
}

fn snippet(text: &str) -> String {
    text.chars().take(100).collect()
}

/// The dashboard's data set: recent slices of listings and posts plus the
/// request count.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub stats: QuickStats,
    pub recent_listings: Vec<Listing>,
    pub recent_posts: Vec<Post>,
}

impl Dashboard {
    /// Fetch the three capped latest-first slices. Any fetch failure
    /// surfaces to the caller, which keeps whatever it showed before.
    pub async fn load(
        listings: &dyn Collection<Listing>,
        posts: &dyn Collection<Post>,
        requests: &dyn Collection<MentorshipRequest>,
    ) -> StoreResult<Dashboard> {
        let recent_listings = listings.list("-created_date", Some(5)).await?;
        let recent_posts = posts.list("-created_date", Some(5)).await?;
        let recent_requests = requests.list("-created_date", Some(10)).await?;
        let stats = QuickStats {
            listings: recent_listings.len(),
            posts: recent_posts.len(),
            mentorship_requests: recent_requests.len(),
        };
        info!(
            listings = stats.listings,
            posts = stats.posts,
            requests = stats.mentorship_requests,
            "dashboard loaded"
        );
        Ok(Dashboard { stats, recent_listings, recent_posts })
    }

    /// Listings and posts merged into one feed, newest first, capped at 6.
    /// The sort is stable, so same-instant rows keep listing-before-post
    /// order.
    pub fn recent_activity(&self) -> Vec<Activity> {
        let mut feed: Vec<Activity> = self
            .recent_listings
            .iter()
            .map(|l| Activity {
                source: ActivitySource::Listing,
                title: l.title.clone(),
                snippet: snippet(&l.description),
                time: l.created_date,
            })
            .chain(self.recent_posts.iter().map(|p| Activity {
                source: ActivitySource::Post,
                title: p.title.clone(),
                snippet: snippet(&p.content),
                time: p.created_date,
            }))
            .collect();
        feed.sort_by(|a, b| b.time.cmp(&a.time));
        feed.truncate(6);
        feed
    }

    /// The five most recent posts, for the trending sidebar.
    pub fn trending(&self) -> &[Post] {
        let n = self.recent_posts.len().min(5);
        &self.recent_posts[..n]
    }

    /// The three most recent listings, for the featured strip.
    pub fn featured(&self) -> &[Listing] {
        let n = self.recent_listings.len().min(3);
        &self.recent_listings[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use compass_client::MemoryStore;
    use compass_core::{Category, Condition, ListingKind, PostKind};
    use uuid::Uuid;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    fn listing(n: u8, title: &str, secs: u32) -> Listing {
        Listing {
            id: Uuid::from_bytes([n; 16]),
            title: title.to_string(),
            description: "d".repeat(150),
            category: Category::Textbook,
            kind: ListingKind::Sell,
            condition: Condition::Good,
            price: 10.0,
            subject: None,
            created_date: at(secs),
        }
    }

    fn post(n: u8, title: &str, secs: u32) -> Post {
        Post {
            id: Uuid::from_bytes([n; 16]),
            title: title.to_string(),
            content: "c".to_string(),
            kind: PostKind::Question,
            subject: None,
            course_code: None,
            tags: smallvec::SmallVec::new(),
            is_resolved: false,
            upvotes: 0,
            created_date: at(secs),
        }
    }

    async fn dashboard() -> Dashboard {
        let listings = MemoryStore::with_records(vec![
            listing(1, "L old", 1),
            listing(2, "L new", 50),
            listing(3, "L mid", 20),
        ]);
        let posts = MemoryStore::with_records(vec![
            post(4, "P new", 60),
            post(5, "P old", 2),
            post(6, "P mid", 30),
        ]);
        let requests: MemoryStore<MentorshipRequest> = MemoryStore::new();
        Dashboard::load(&listings, &posts, &requests).await.unwrap()
    }

    #[tokio::test]
    async fn stats_count_the_capped_slices() {
        let d = dashboard().await;
        assert_eq!(d.stats.listings, 3);
        assert_eq!(d.stats.posts, 3);
        assert_eq!(d.stats.mentorship_requests, 0);
    }

    #[tokio::test]
    async fn recent_activity_merges_newest_first() {
        let d = dashboard().await;
        let feed = d.recent_activity();
        assert_eq!(feed.len(), 6);
        let titles: Vec<&str> = feed.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["P new", "L new", "P mid", "L mid", "P old", "L old"]);
        assert!(feed.windows(2).all(|w| w[0].time >= w[1].time));
    }

    #[tokio::test]
    async fn snippets_are_truncated() {
        let d = dashboard().await;
        let first_listing = d
            .recent_activity()
            .into_iter()
            .find(|a| a.source == ActivitySource::Listing)
            .unwrap();
        assert_eq!(first_listing.snippet.len(), 100);
    }

    #[tokio::test]
    async fn trending_and_featured_are_capped() {
        let d = dashboard().await;
        assert_eq!(d.trending().len(), 3);
        assert_eq!(d.featured().len(), 3);
        assert_eq!(d.trending()[0].title, "P new");
        assert_eq!(d.featured()[0].title, "L new");
    }
}
