use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ServiceError, ServiceResult};

/// Post entity. Score and comment count are derived at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub author_id: Uuid,
    pub group_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Comment entity - a root comment when `parent_id` is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Friendship row. Direction carries no meaning: a row either way makes two users friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Friendship {
    pub user_id: Uuid,
    pub friend_id: Uuid,
}

impl Friendship {
    /// The other side of the friendship as seen from `user_id`.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_id == user_id && self.friend_id != user_id {
            Some(self.friend_id)
        } else if self.friend_id == user_id && self.user_id != user_id {
            Some(self.user_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Post => "post",
            TargetType::Comment => "comment",
        }
    }
}

impl std::str::FromStr for TargetType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(TargetType::Post),
            "comment" => Ok(TargetType::Comment),
            other => Err(ServiceError::InvalidTarget(format!(
                "unknown target type '{}'",
                other
            ))),
        }
    }
}

/// Something that can receive votes: exactly one post or one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum VoteTarget {
    Post(Uuid),
    Comment(Uuid),
}

impl VoteTarget {
    /// Build a target from the optional id pair an API request carries.
    /// Exactly one of the two must be present.
    pub fn from_ids(post_id: Option<Uuid>, comment_id: Option<Uuid>) -> ServiceResult<Self> {
        match (post_id, comment_id) {
            (Some(post_id), None) => Ok(VoteTarget::Post(post_id)),
            (None, Some(comment_id)) => Ok(VoteTarget::Comment(comment_id)),
            (Some(_), Some(_)) => Err(ServiceError::InvalidTarget(
                "postId and commentId are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ServiceError::InvalidTarget(
                "either postId or commentId must be provided".to_string(),
            )),
        }
    }

    pub fn new(target_type: TargetType, id: Uuid) -> Self {
        match target_type {
            TargetType::Post => VoteTarget::Post(id),
            TargetType::Comment => VoteTarget::Comment(id),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            VoteTarget::Post(_) => TargetType::Post,
            VoteTarget::Comment(_) => TargetType::Comment,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            VoteTarget::Post(id) | VoteTarget::Comment(id) => *id,
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target_type().as_str(), self.id())
    }
}

/// A stored vote. `value` is always -1 or +1; "no vote" is the absence of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target: VoteTarget,
    pub value: i16,
}

/// Vote value requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteValue {
    Down,
    Clear,
    Up,
}

impl VoteValue {
    pub fn as_i16(&self) -> i16 {
        match self {
            VoteValue::Down => -1,
            VoteValue::Clear => 0,
            VoteValue::Up => 1,
        }
    }

    /// The value a "click" on `clicked` should request given the current vote:
    /// clicking the active button clears it.
    pub fn toggled(current: i16, clicked: VoteValue) -> VoteValue {
        if current == clicked.as_i16() {
            VoteValue::Clear
        } else {
            clicked
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = ServiceError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(VoteValue::Down),
            0 => Ok(VoteValue::Clear),
            1 => Ok(VoteValue::Up),
            other => Err(ServiceError::InvalidValue(other)),
        }
    }
}

/// Vote request as an API layer receives it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub value: i64,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
}

impl VoteRequest {
    pub fn target(&self) -> ServiceResult<VoteTarget> {
        VoteTarget::from_ids(self.post_id, self.comment_id)
    }
}

/// Result of applying a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub final_value: i16,
    /// `final_value - previous_value`, for optimistic score updates
    pub score_delta: i64,
}

/// Post with its ledger score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredPost {
    pub post: Post,
    pub score: i64,
}

/// Post as delivered in a feed page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub post: Post,
    pub score: i64,
    pub comment_count: i64,
}

/// Post selection criteria for `DiscussionStore::find_posts`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub author_ids: Option<Vec<Uuid>>,
    pub group_id: Option<Uuid>,
    pub created_since: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the title or the content
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Request payload for creating a post
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[validate(length(min = 3, max = 300))]
    pub title: String,
    pub content: Option<String>,
    pub group_id: Uuid,
}

/// Request payload for creating a comment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub content: String,
}
