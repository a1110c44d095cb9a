//! Entity kinds and their creation drafts. Closed vocabularies are enums so
//! malformed records are rejected when they are shaped at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::{Entity, FieldErrors, FieldValue, Record, UnknownVariant};

macro_rules! vocab {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant { what: $what, value: s.to_string() }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocab!(Category, "category", {
    Textbook => "textbook",
    LabEquipment => "lab_equipment",
    Notes => "notes",
    Electronics => "electronics",
    Supplies => "supplies",
    Other => "other",
});

vocab!(ListingKind, "listing kind", {
    Sell => "sell",
    Rent => "rent",
    Exchange => "exchange",
    Donate => "donate",
});

vocab!(Condition, "condition", {
    New => "new",
    LikeNew => "like_new",
    Good => "good",
    Fair => "fair",
    Poor => "poor",
});

vocab!(PostKind, "post type", {
    Question => "question",
    Discussion => "discussion",
    Announcement => "announcement",
    StudyGroup => "study_group",
});

// ---------------- Listing ----------------

/// A marketplace resource listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub kind: ListingKind,
    pub condition: Condition,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub created_date: DateTime<Utc>,
}

impl Record for Listing {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "title" => Some(FieldValue::Text(&self.title)),
            "description" => Some(FieldValue::Text(&self.description)),
            "category" => Some(FieldValue::Text(self.category.as_str())),
            "kind" => Some(FieldValue::Text(self.kind.as_str())),
            "condition" => Some(FieldValue::Text(self.condition.as_str())),
            "price" => Some(FieldValue::Number(self.price)),
            "subject" => self.subject.as_deref().map(FieldValue::Text),
            "created_date" => Some(FieldValue::Time(self.created_date)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub kind: ListingKind,
    pub condition: Condition,
    pub price: f64,
    #[serde(default)]
    pub subject: Option<String>,
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl Default for ListingKind {
    fn default() -> Self {
        ListingKind::Sell
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Good
    }
}

impl ListingDraft {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.insert("title", "Title is required".into());
        }
        if self.description.trim().is_empty() {
            errors.insert("description", "Description is required".into());
        }
        if !self.price.is_finite() || self.price < 0.0 {
            errors.insert("price", "Price must be a non-negative number".into());
        }
        errors
    }
}

impl Entity for Listing {
    type Draft = ListingDraft;
    const KIND: &'static str = "listing";

    fn validate(draft: &ListingDraft) -> FieldErrors {
        draft.validate()
    }

    fn from_draft(draft: ListingDraft, id: Uuid, created: DateTime<Utc>) -> Self {
        Listing {
            id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            kind: draft.kind,
            condition: draft.condition,
            price: draft.price,
            subject: draft.subject.filter(|s| !s.trim().is_empty()),
            created_date: created,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

// ---------------- Post ----------------

/// A forum post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub kind: PostKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(default)]
    pub tags: SmallVec<[String; 4]>,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub upvotes: u32,
    pub created_date: DateTime<Utc>,
}

impl Post {
    /// Facet rendering of the resolved flag.
    pub fn status(&self) -> &'static str {
        if self.is_resolved {
            "resolved"
        } else {
            "unresolved"
        }
    }
}

impl Record for Post {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "title" => Some(FieldValue::Text(&self.title)),
            "content" => Some(FieldValue::Text(&self.content)),
            "kind" => Some(FieldValue::Text(self.kind.as_str())),
            "subject" => self.subject.as_deref().map(FieldValue::Text),
            "course_code" => self.course_code.as_deref().map(FieldValue::Text),
            "tags" => Some(FieldValue::Tags(&self.tags)),
            "status" => Some(FieldValue::Text(self.status())),
            "is_resolved" => Some(FieldValue::Flag(self.is_resolved)),
            "upvotes" => Some(FieldValue::Number(self.upvotes as f64)),
            "created_date" => Some(FieldValue::Time(self.created_date)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub kind: Option<PostKind>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub tags: SmallVec<[String; 4]>,
}

impl PostDraft {
    /// Add a tag, normalized to trimmed lowercase; duplicates and empty
    /// input are dropped.
    pub fn add_tag(&mut self, tag: &str) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !self.tags.iter().any(|t| *t == tag) {
            self.tags.push(tag);
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.insert("title", "Title is required".into());
        }
        if self.content.trim().is_empty() {
            errors.insert("content", "Content is required".into());
        }
        if self.kind.is_none() {
            errors.insert("kind", "Post type is required".into());
        }
        errors
    }
}

impl Entity for Post {
    type Draft = PostDraft;
    const KIND: &'static str = "post";

    fn validate(draft: &PostDraft) -> FieldErrors {
        draft.validate()
    }

    fn from_draft(draft: PostDraft, id: Uuid, created: DateTime<Utc>) -> Self {
        Post {
            id,
            title: draft.title,
            content: draft.content,
            // validate() guarantees the kind is present
            kind: draft.kind.unwrap_or(PostKind::Discussion),
            subject: draft.subject.filter(|s| !s.trim().is_empty()),
            course_code: draft.course_code.filter(|s| !s.trim().is_empty()),
            tags: draft.tags,
            is_resolved: false,
            upvotes: 0,
            created_date: created,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

// ---------------- Mentor ----------------

/// A mentor profile. Mentors carry no creation timestamp; the store keeps
/// their submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentor {
    pub id: Uuid,
    pub full_name: String,
    pub major: String,
    pub year: String,
    pub bio: String,
    #[serde(default)]
    pub skills: SmallVec<[String; 4]>,
}

impl Record for Mentor {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "full_name" => Some(FieldValue::Text(&self.full_name)),
            "major" => Some(FieldValue::Text(&self.major)),
            "year" => Some(FieldValue::Text(&self.year)),
            "bio" => Some(FieldValue::Text(&self.bio)),
            "skills" => Some(FieldValue::Tags(&self.skills)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentorDraft {
    pub full_name: String,
    pub major: String,
    pub year: String,
    pub bio: String,
    #[serde(default)]
    pub skills: SmallVec<[String; 4]>,
}

impl MentorDraft {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.full_name.trim().is_empty() {
            errors.insert("full_name", "Name is required".into());
        }
        if self.major.trim().is_empty() {
            errors.insert("major", "Major is required".into());
        }
        errors
    }
}

impl Entity for Mentor {
    type Draft = MentorDraft;
    const KIND: &'static str = "mentor";

    fn validate(draft: &MentorDraft) -> FieldErrors {
        draft.validate()
    }

    fn from_draft(draft: MentorDraft, id: Uuid, _created: DateTime<Utc>) -> Self {
        Mentor {
            id,
            full_name: draft.full_name,
            major: draft.major,
            year: draft.year,
            bio: draft.bio,
            skills: draft.skills,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

// ---------------- Mentorship request ----------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorshipRequest {
    pub id: Uuid,
    pub mentor_id: Uuid,
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_preference: Option<String>,
    pub created_date: DateTime<Utc>,
}

impl Record for MentorshipRequest {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "subject" => Some(FieldValue::Text(&self.subject)),
            "message" => Some(FieldValue::Text(&self.message)),
            "created_date" => Some(FieldValue::Time(self.created_date)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestDraft {
    pub mentor_id: Uuid,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub meeting_preference: Option<String>,
}

impl RequestDraft {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.subject.trim().is_empty() {
            errors.insert("subject", "Subject is required".into());
        }
        if self.message.trim().is_empty() {
            errors.insert("message", "Message is required".into());
        }
        errors
    }
}

impl Entity for MentorshipRequest {
    type Draft = RequestDraft;
    const KIND: &'static str = "mentorship_request";

    fn validate(draft: &RequestDraft) -> FieldErrors {
        draft.validate()
    }

    fn from_draft(draft: RequestDraft, id: Uuid, created: DateTime<Utc>) -> Self {
        MentorshipRequest {
            id,
            mentor_id: draft.mentor_id,
            subject: draft.subject,
            message: draft.message,
            meeting_preference: draft.meeting_preference.filter(|s| !s.trim().is_empty()),
            created_date: created,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }
}
