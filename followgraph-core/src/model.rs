use serde::{Deserialize, Serialize};

/// A stored profile. `id` is the store's rowid, `external_id` the source API's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub external_id: String,
    pub handle: String,
    pub name: String,
    pub headline: String,
    pub gender: i32,
    pub avatar_url: Option<String>,
    pub user_type: Option<String>,
    pub is_advertiser: bool,
    pub is_org: bool,
    pub follower_count: u64,
    pub answer_count: u64,
    pub articles_count: u64,
    pub created_at: i64,
}

/// A user that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewUser {
    pub external_id: String,
    pub handle: String,
    pub name: String,
    pub headline: String,
    pub gender: i32,
    pub avatar_url: Option<String>,
    pub user_type: Option<String>,
    pub is_advertiser: bool,
    pub is_org: bool,
    pub follower_count: u64,
    pub answer_count: u64,
    pub articles_count: u64,
}

impl NewUser {
    pub fn new(external_id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            handle: handle.into(),
            gender: -1,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// "follower follows followee", both as internal ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowEdge {
    pub followee_id: i64,
    pub follower_id: i64,
}

/// One entry of a followers page as the API returns it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub url_token: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default = "unknown_gender")]
    pub gender: i32,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, rename = "type")]
    pub user_type: Option<String>,
    #[serde(default)]
    pub is_advertiser: bool,
    #[serde(default)]
    pub is_org: bool,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub answer_count: u64,
    #[serde(default)]
    pub articles_count: u64,
}

fn unknown_gender() -> i32 {
    -1
}

impl From<UserRecord> for NewUser {
    fn from(record: UserRecord) -> Self {
        Self {
            external_id: record.id,
            handle: record.url_token,
            name: record.name,
            headline: record.headline,
            gender: record.gender,
            avatar_url: record.avatar_url,
            user_type: record.user_type,
            is_advertiser: record.is_advertiser,
            is_org: record.is_org,
            follower_count: record.follower_count,
            answer_count: record.answer_count,
            articles_count: record.articles_count,
        }
    }
}

/// One parsed response. Lives for a single fetch/parse/persist cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerPage {
    pub records: Vec<UserRecord>,
    pub total_count: u64,
    pub is_end: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    pub offset: u64,
    pub limit: u32,
}

impl PaginationCursor {
    pub fn new(limit: u32) -> Self {
        Self { offset: 0, limit }
    }

    /// Records covered once the current page is processed.
    pub fn consumed(&self) -> u64 {
        self.offset + u64::from(self.limit)
    }

    pub fn has_more(&self, total_count: u64) -> bool {
        self.consumed() < total_count
    }

    pub fn advance(&mut self) {
        self.offset += u64::from(self.limit);
    }
}
