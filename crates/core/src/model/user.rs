use chrono::{DateTime, Utc};
use serde::Serialize;

/// Database row representation of a user.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub external_id: String,
    pub username: String,
    pub language: String,
    pub moderator: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a user created from an external token.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub external_id: String,
    pub username: String,
    pub language: String,
}

/// The authenticated caller of a write operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    /// Local user id, absent when the token's user has no row yet.
    pub user_id: Option<i64>,
    pub external_id: String,
    pub username: String,
    pub language: String,
    pub moderator: bool,
}

impl Actor {
    /// Only the owner may create, edit or restructure a project.
    pub fn owns(&self, owner_id: i64) -> bool {
        self.user_id == Some(owner_id)
    }

    /// Owners and moderators may delete a project.
    pub fn can_delete(&self, owner_id: i64) -> bool {
        self.moderator || self.owns(owner_id)
    }

    pub fn as_new_user(&self) -> NewUser {
        NewUser {
            external_id: self.external_id.clone(),
            username: self.username.clone(),
            language: self.language.clone(),
        }
    }
}
