use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted refresh-token row. `token_hash` is the sha-256 of the raw
/// token; the raw value only ever travels in the HTTP-only cookie.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// What session listing exposes to clients: device metadata only, never the
/// token hash.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SessionInfo {
    pub id: Uuid,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionsPage {
    pub sessions: Vec<SessionInfo>,
    /// Heuristic: a full page is assumed to have a successor. The last page
    /// can report a false positive when it exactly fills `page_size`.
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

impl SessionsQuery {
    /// Clamp to sane bounds so a hostile query cannot request an unbounded
    /// page or a zero offset underflow.
    pub fn normalized(&self) -> (u32, u32) {
        let page = self.page.max(1);
        let page_size = self.page_size.clamp(1, 100);
        (page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults() {
        let q: SessionsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.normalized(), (1, 20));
    }

    #[test]
    fn query_clamps_bounds() {
        let q = SessionsQuery { page: 0, page_size: 5000 };
        assert_eq!(q.normalized(), (1, 100));

        let q = SessionsQuery { page: 3, page_size: 0 };
        assert_eq!(q.normalized(), (3, 1));
    }
}
