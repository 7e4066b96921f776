use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::DiscussionStore;
use crate::domain::models::{
    Comment, Friendship, Post, PostFilter, SortOrder, TargetType, Vote, VoteTarget,
};
use crate::error::{StoreError, StoreResult};

/// Row shape of the `votes` table
#[derive(sqlx::FromRow)]
struct VoteRow {
    id: Uuid,
    user_id: Uuid,
    target_type: String,
    target_id: Uuid,
    value: i16,
}

impl TryFrom<VoteRow> for Vote {
    type Error = StoreError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        let target_type: TargetType = row
            .target_type
            .parse()
            .map_err(|_| StoreError::Internal(format!("bad target_type '{}'", row.target_type)))?;
        Ok(Vote {
            id: row.id,
            user_id: row.user_id,
            target: VoteTarget::new(target_type, row.target_id),
            value: row.value,
        })
    }
}

fn into_votes(rows: Vec<VoteRow>) -> StoreResult<Vec<Vote>> {
    rows.into_iter().map(Vote::try_from).collect()
}

/// `%text%` with LIKE wildcards in `text` matched literally
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// PostgreSQL-backed store (source of truth)
#[derive(Clone)]
pub struct PgDiscussionStore {
    pool: PgPool,
}

impl PgDiscussionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn push_post_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
        if let Some(author_ids) = &filter.author_ids {
            qb.push(" AND author_id = ANY(")
                .push_bind(author_ids.clone())
                .push(")");
        }
        if let Some(group_id) = filter.group_id {
            qb.push(" AND group_id = ").push_bind(group_id);
        }
        if let Some(since) = filter.created_since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(text) = &filter.text {
            let pattern = like_pattern(text);
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR content ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

#[async_trait]
impl DiscussionStore for PgDiscussionStore {
    async fn find_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, content, author_id, group_id, created_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn find_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, content, author_id, post_id, parent_id, created_at
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, title, content, author_id, group_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.author_id)
        .bind(post.group_id)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, content, author_id, post_id, parent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(comment.id)
        .bind(&comment.content)
        .bind(comment.author_id)
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_comments_by_post(
        &self,
        post_id: Uuid,
        order: SortOrder,
    ) -> StoreResult<Vec<Comment>> {
        let query = format!(
            r#"
            SELECT id, content, author_id, post_id, parent_id, created_at
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at {0}, id {0}
            "#,
            order.as_sql()
        );

        let comments = sqlx::query_as::<_, Comment>(&query)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(comments)
    }

    async fn count_comments(&self, post_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, i64>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT post_id, COUNT(*)
            FROM comments
            WHERE post_id = ANY($1)
            GROUP BY post_id
            "#,
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn find_votes(&self, target: VoteTarget) -> StoreResult<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT id, user_id, target_type, target_id, value
            FROM votes
            WHERE target_type = $1 AND target_id = $2
            "#,
        )
        .bind(target.target_type().as_str())
        .bind(target.id())
        .fetch_all(&self.pool)
        .await?;

        into_votes(rows)
    }

    async fn find_votes_for_targets(
        &self,
        target_type: TargetType,
        target_ids: &[Uuid],
    ) -> StoreResult<Vec<Vote>> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT id, user_id, target_type, target_id, value
            FROM votes
            WHERE target_type = $1 AND target_id = ANY($2)
            "#,
        )
        .bind(target_type.as_str())
        .bind(target_ids)
        .fetch_all(&self.pool)
        .await?;

        into_votes(rows)
    }

    async fn find_user_vote(
        &self,
        user_id: Uuid,
        target: VoteTarget,
    ) -> StoreResult<Option<Vote>> {
        let row = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT id, user_id, target_type, target_id, value
            FROM votes
            WHERE user_id = $1 AND target_type = $2 AND target_id = $3
            "#,
        )
        .bind(user_id)
        .bind(target.target_type().as_str())
        .bind(target.id())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Vote::try_from).transpose()
    }

    async fn find_votes_by_user(&self, user_id: Uuid, value: i16) -> StoreResult<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT id, user_id, target_type, target_id, value
            FROM votes
            WHERE user_id = $1 AND value = $2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        into_votes(rows)
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        // Plain INSERT: the unique index on (user_id, target_type, target_id)
        // turns a lost race into StoreError::UniqueViolation.
        sqlx::query(
            r#"
            INSERT INTO votes (id, user_id, target_type, target_id, value)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(vote.id)
        .bind(vote.user_id)
        .bind(vote.target.target_type().as_str())
        .bind(vote.target.id())
        .bind(vote.value)
        .execute(&self.pool)
        .await?;

        debug!(vote_id = %vote.id, target = %vote.target, "vote inserted");
        Ok(())
    }

    async fn update_vote(&self, vote_id: Uuid, value: i16) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE votes
            SET value = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(vote_id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_vote(&self, vote_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(vote_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_posts(
        &self,
        filter: &PostFilter,
        order: SortOrder,
        skip: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Post>, i64)> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, title, content, author_id, group_id, created_at FROM posts WHERE TRUE",
        );
        Self::push_post_filter(&mut qb, filter);
        qb.push(format!(
            " ORDER BY created_at {0}, id {0} LIMIT ",
            order.as_sql()
        ))
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(skip);

        let posts = qb.build_query_as::<Post>().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts WHERE TRUE");
        Self::push_post_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((posts, total))
    }

    async fn find_friendships(&self, user_id: Uuid) -> StoreResult<Vec<Friendship>> {
        let rows = sqlx::query_as::<_, Friendship>(
            r#"
            SELECT user_id, friend_id
            FROM friendships
            WHERE user_id = $1 OR friend_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
