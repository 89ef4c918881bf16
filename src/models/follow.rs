use serde::Serialize;

/// Directed edge: `user_id` follows `author_id`. Unique per pair, never a loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Follow {
    pub id: i64,
    pub user_id: i64,
    pub author_id: i64,
}
