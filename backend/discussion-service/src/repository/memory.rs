use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::DiscussionStore;
use crate::domain::models::{
    Comment, Friendship, Post, PostFilter, SortOrder, TargetType, Vote, VoteTarget,
};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    votes: Vec<Vote>,
    friendships: Vec<Friendship>,
}

/// Process-local store with the same uniqueness rules as the PostgreSQL schema.
/// Used for embedding the engine and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a friendship. Duplicates in either direction are ignored.
    pub fn add_friendship(&self, user_id: Uuid, friend_id: Uuid) {
        let mut tables = self.tables.write();
        let exists = tables.friendships.iter().any(|f| {
            (f.user_id == user_id && f.friend_id == friend_id)
                || (f.user_id == friend_id && f.friend_id == user_id)
        });
        if !exists && user_id != friend_id {
            tables.friendships.push(Friendship { user_id, friend_id });
        }
    }

    pub fn vote_count(&self) -> usize {
        self.tables.read().votes.len()
    }
}

fn matches_filter(post: &Post, filter: &PostFilter) -> bool {
    if let Some(author_ids) = &filter.author_ids {
        if !author_ids.contains(&post.author_id) {
            return false;
        }
    }
    if let Some(group_id) = filter.group_id {
        if post.group_id != group_id {
            return false;
        }
    }
    if let Some(since) = filter.created_since {
        if post.created_at < since {
            return false;
        }
    }
    if let Some(text) = &filter.text {
        let needle = text.to_lowercase();
        let in_content = post
            .content
            .as_deref()
            .map_or(false, |c| c.to_lowercase().contains(&needle));
        if !post.title.to_lowercase().contains(&needle) && !in_content {
            return false;
        }
    }
    true
}

#[async_trait]
impl DiscussionStore for InMemoryStore {
    async fn find_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        let tables = self.tables.read();
        Ok(tables.posts.iter().find(|p| p.id == post_id).cloned())
    }

    async fn find_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        let tables = self.tables.read();
        Ok(tables.comments.iter().find(|c| c.id == comment_id).cloned())
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.posts.iter().any(|p| p.id == post.id) {
            return Err(StoreError::UniqueViolation(format!("post {}", post.id)));
        }
        tables.posts.push(post.clone());
        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.comments.iter().any(|c| c.id == comment.id) {
            return Err(StoreError::UniqueViolation(format!(
                "comment {}",
                comment.id
            )));
        }
        tables.comments.push(comment.clone());
        Ok(())
    }

    async fn find_comments_by_post(
        &self,
        post_id: Uuid,
        order: SortOrder,
    ) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read();
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| {
            let ord = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        Ok(comments)
    }

    async fn count_comments(&self, post_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>> {
        let tables = self.tables.read();
        let mut counts = HashMap::new();
        for comment in tables.comments.iter().filter(|c| post_ids.contains(&c.post_id)) {
            *counts.entry(comment.post_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_votes(&self, target: VoteTarget) -> StoreResult<Vec<Vote>> {
        let tables = self.tables.read();
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.target == target)
            .cloned()
            .collect())
    }

    async fn find_votes_for_targets(
        &self,
        target_type: TargetType,
        target_ids: &[Uuid],
    ) -> StoreResult<Vec<Vote>> {
        let tables = self.tables.read();
        Ok(tables
            .votes
            .iter()
            .filter(|v| {
                v.target.target_type() == target_type && target_ids.contains(&v.target.id())
            })
            .cloned()
            .collect())
    }

    async fn find_user_vote(
        &self,
        user_id: Uuid,
        target: VoteTarget,
    ) -> StoreResult<Option<Vote>> {
        let tables = self.tables.read();
        Ok(tables
            .votes
            .iter()
            .find(|v| v.user_id == user_id && v.target == target)
            .cloned())
    }

    async fn find_votes_by_user(&self, user_id: Uuid, value: i16) -> StoreResult<Vec<Vote>> {
        let tables = self.tables.read();
        // Rows are kept in insertion order
        Ok(tables
            .votes
            .iter()
            .rev()
            .filter(|v| v.user_id == user_id && v.value == value)
            .cloned()
            .collect())
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables
            .votes
            .iter()
            .any(|v| v.user_id == vote.user_id && v.target == vote.target)
        {
            return Err(StoreError::UniqueViolation(format!(
                "vote by {} on {}",
                vote.user_id, vote.target
            )));
        }
        tables.votes.push(vote.clone());
        Ok(())
    }

    async fn update_vote(&self, vote_id: Uuid, value: i16) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        match tables.votes.iter_mut().find(|v| v.id == vote_id) {
            Some(vote) => {
                vote.value = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_vote(&self, vote_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.votes.len();
        tables.votes.retain(|v| v.id != vote_id);
        Ok(tables.votes.len() < before)
    }

    async fn find_posts(
        &self,
        filter: &PostFilter,
        order: SortOrder,
        skip: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Post>, i64)> {
        let tables = self.tables.read();
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| matches_filter(p, filter))
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            let ord = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = posts.len() as i64;
        let page = posts
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn find_friendships(&self, user_id: Uuid) -> StoreResult<Vec<Friendship>> {
        let tables = self.tables.read();
        Ok(tables
            .friendships
            .iter()
            .filter(|f| f.user_id == user_id || f.friend_id == user_id)
            .cloned()
            .collect())
    }
}
