use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Two-dimensional page position. Compared `x` first, then `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderingKey {
    pub x: i32,
    pub y: i32,
}

impl OrderingKey {
    pub const ORIGIN: OrderingKey = OrderingKey { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Total order over a project's pages: position, then page id.
/// Exactly one page per project holds the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey {
    pub position: OrderingKey,
    pub page_id: i64,
}

impl CanonicalKey {
    pub fn new(position: OrderingKey, page_id: i64) -> Self {
        Self { position, page_id }
    }
}

/// Database row representation of a page.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PageRecord {
    pub id: i64,
    pub project_id: i64,
    pub x: i32,
    pub y: i32,
    pub styles: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PageRecord {
    pub fn position(&self) -> OrderingKey {
        OrderingKey::new(self.x, self.y)
    }

    pub fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(self.position(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    pub project_id: i64,
    pub position: OrderingKey,
    pub styles: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub styles: Option<Value>,
}

/// Database row representation of a page element.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ElementRecord {
    pub id: i64,
    pub page_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub element_type: String,
    pub attributes: Value,
    pub styles: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewElement {
    pub page_id: i64,
    pub element_type: String,
    pub attributes: Value,
    pub styles: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ElementChanges {
    #[serde(rename = "type")]
    pub element_type: Option<String>,
    pub attributes: Option<Value>,
    pub styles: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_orders_x_before_y() {
        assert!(OrderingKey::new(0, 5) < OrderingKey::new(1, 0));
        assert!(OrderingKey::new(1, 0) < OrderingKey::new(1, 1));
    }

    #[test]
    fn page_id_breaks_position_ties() {
        let a = CanonicalKey::new(OrderingKey::ORIGIN, 3);
        let b = CanonicalKey::new(OrderingKey::ORIGIN, 9);
        assert!(a < b);
        assert!(CanonicalKey::new(OrderingKey::new(0, 1), 1) > b);
    }
}
