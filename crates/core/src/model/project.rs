use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thumbnail size classes stored on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThumbnailSize {
    Small,
    Large,
}

impl ThumbnailSize {
    pub const ALL: [ThumbnailSize; 2] = [ThumbnailSize::Small, ThumbnailSize::Large];

    /// Key used in the outward `thumbnail` object.
    pub fn key(self) -> &'static str {
        match self {
            ThumbnailSize::Small => "400",
            ThumbnailSize::Large => "1024",
        }
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Database row representation of a project.
/// Maps to the `projects` PostgreSQL table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: i64,
    pub user_id: i64,
    pub remixed_from: Option<i64>,
    pub version: String,
    pub title: String,
    pub language: String,
    pub featured: bool,
    pub thumbnail_400: Option<String>,
    pub thumbnail_1024: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn thumbnail(&self, size: ThumbnailSize) -> Option<&str> {
        match size {
            ThumbnailSize::Small => self.thumbnail_400.as_deref(),
            ThumbnailSize::Large => self.thumbnail_1024.as_deref(),
        }
    }
}

/// Values for a project insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub user_id: i64,
    pub remixed_from: Option<i64>,
    pub version: String,
    pub title: String,
    pub language: String,
    pub thumbnail_400: Option<String>,
    pub thumbnail_1024: Option<String>,
}

/// Partial update of a project row. `None` leaves the stored value untouched;
/// `Some("")` on a thumbnail clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub thumbnail_400: Option<String>,
    pub thumbnail_1024: Option<String>,
    pub featured: Option<bool>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.thumbnail_400.is_none()
            && self.thumbnail_1024.is_none()
            && self.featured.is_none()
    }

    pub fn set_thumbnail(&mut self, size: ThumbnailSize, value: impl Into<String>) {
        let value = Some(value.into());
        match size {
            ThumbnailSize::Small => self.thumbnail_400 = value,
            ThumbnailSize::Large => self.thumbnail_1024 = value,
        }
    }

    /// Both variants derived from a single capture.
    pub fn thumbnails(screenshot: &str) -> Self {
        let mut changes = Self::default();
        for size in ThumbnailSize::ALL {
            changes.set_thumbnail(size, screenshot);
        }
        changes
    }
}

/// Outward JSON shape of a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub version: String,
    pub remixed_from: Option<String>,
    pub featured: bool,
    /// Keys never set are omitted; a cleared key is present with `""`.
    pub thumbnail: BTreeMap<String, String>,
    pub history: History,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectRecord> for Project {
    fn from(row: ProjectRecord) -> Self {
        let mut thumbnail = BTreeMap::new();
        for size in ThumbnailSize::ALL {
            if let Some(value) = row.thumbnail(size) {
                thumbnail.insert(size.key().to_string(), value.to_string());
            }
        }
        Self {
            id: row.id.to_string(),
            user_id: row.user_id.to_string(),
            title: row.title,
            version: row.version,
            remixed_from: row.remixed_from.map(|id| id.to_string()),
            featured: row.featured,
            thumbnail,
            history: History {
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ProjectRecord {
        let now = Utc::now();
        ProjectRecord {
            id: 7,
            user_id: 1,
            remixed_from: None,
            version: "test".into(),
            title: "create_test".into(),
            language: "en-US".into(),
            featured: false,
            thumbnail_400: None,
            thumbnail_1024: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unset_thumbnails_are_omitted() {
        let project = Project::from(row());
        assert!(project.thumbnail.is_empty());
        assert_eq!(project.remixed_from, None);
    }

    #[test]
    fn cleared_thumbnail_is_present_and_empty() {
        let mut r = row();
        r.thumbnail_400 = Some(String::new());
        r.thumbnail_1024 = Some("https://example.com/a.png".into());
        let project = Project::from(r);
        assert_eq!(project.thumbnail.get("400").map(String::as_str), Some(""));
        assert_eq!(
            project.thumbnail.get("1024").map(String::as_str),
            Some("https://example.com/a.png")
        );
    }

    #[test]
    fn thumbnails_sets_both_variants() {
        let changes = ProjectChanges::thumbnails("shot.png");
        assert_eq!(changes.thumbnail_400.as_deref(), Some("shot.png"));
        assert_eq!(changes.thumbnail_1024.as_deref(), Some("shot.png"));
        assert!(changes.title.is_none());
    }
}
