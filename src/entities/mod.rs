//! sea-orm entities.
//!
//! Embedded sub-documents (order items, timelines, address books) are stored
//! as JSON columns through typed `FromJsonQueryResult` wrappers so that the
//! rest of the crate never handles raw `serde_json::Value`.

pub mod homepage_section;
pub mod order;
pub mod product;
pub mod project;
pub mod promo_code;
pub mod return_request;
pub mod review;
pub mod support_ticket;
pub mod testimonial;
pub mod user;

use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct StringList(pub Vec<String>);

impl From<Vec<String>> for StringList {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct UuidList(pub Vec<Uuid>);

impl UuidList {
    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }
}

/// One entry of an append-only status log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimelineEntry {
    pub status: String,
    pub note: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct Timeline(pub Vec<TimelineEntry>);

impl Timeline {
    pub fn starting_with(status: impl ToString, note: impl Into<String>) -> Self {
        let mut timeline = Self::default();
        timeline.push(status, note);
        timeline
    }

    /// Appends an entry. Existing entries are never rewritten.
    pub fn push(&mut self, status: impl ToString, note: impl Into<String>) {
        self.0.push(TimelineEntry {
            status: status.to_string(),
            note: note.into(),
            at: Utc::now(),
        });
    }

    pub fn with(mut self, status: impl ToString, note: impl Into<String>) -> Self {
        self.push(status, note);
        self
    }

    pub fn last(&self) -> Option<&TimelineEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
