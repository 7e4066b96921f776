use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{
    Comment, Friendship, Post, PostFilter, SortOrder, TargetType, Vote, VoteTarget,
};
use crate::error::StoreResult;

/// Persistence collaborator consumed by the engine.
/// `PgDiscussionStore` (PostgreSQL) and `InMemoryStore` implement this.
///
/// Vote writes are expected to run under a uniqueness constraint on
/// `(user_id, target_type, target_id)`: `insert_vote` must fail with
/// `StoreError::UniqueViolation` instead of creating a second row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscussionStore: Send + Sync {
    /// Get a post by ID
    async fn find_post(&self, post_id: Uuid) -> StoreResult<Option<Post>>;

    /// Get a comment by ID
    async fn find_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>>;

    async fn insert_post(&self, post: &Post) -> StoreResult<()>;

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()>;

    /// All comments of a post ordered by `created_at`
    async fn find_comments_by_post(
        &self,
        post_id: Uuid,
        order: SortOrder,
    ) -> StoreResult<Vec<Comment>>;

    /// Comment counts keyed by post id. Posts without comments may be absent.
    async fn count_comments(&self, post_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>>;

    /// Every vote cast on a target
    async fn find_votes(&self, target: VoteTarget) -> StoreResult<Vec<Vote>>;

    /// Every vote cast on any of the given targets
    async fn find_votes_for_targets(
        &self,
        target_type: TargetType,
        target_ids: &[Uuid],
    ) -> StoreResult<Vec<Vote>>;

    async fn find_user_vote(&self, user_id: Uuid, target: VoteTarget)
        -> StoreResult<Option<Vote>>;

    /// Votes of one user with the given value, most recently cast first
    async fn find_votes_by_user(&self, user_id: Uuid, value: i16) -> StoreResult<Vec<Vote>>;

    /// Insert a vote row; fails with `UniqueViolation` if the user already voted on the target
    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()>;

    /// Change the value of a vote row. Returns false if the row no longer exists.
    async fn update_vote(&self, vote_id: Uuid, value: i16) -> StoreResult<bool>;

    /// Delete a vote row. Returns false if the row no longer exists.
    async fn delete_vote(&self, vote_id: Uuid) -> StoreResult<bool>;

    /// Page through posts ordered by `(created_at, id)`
    /// Returns: (posts, total_count)
    async fn find_posts(
        &self,
        filter: &PostFilter,
        order: SortOrder,
        skip: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Post>, i64)>;

    /// Friendship rows naming `user_id` on either side
    async fn find_friendships(&self, user_id: Uuid) -> StoreResult<Vec<Friendship>>;
}
