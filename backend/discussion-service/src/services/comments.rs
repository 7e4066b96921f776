/// Comment service - comment creation and the threaded discussion view of a post
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::{Comment, NewComment, Post, SortOrder, TargetType, VoteTarget};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::DiscussionStore;
use crate::services::comment_tree::{CommentNode, CommentTree};
use crate::services::votes::VoteLedger;

/// A post with its scored reply forest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub post: Post,
    pub score: i64,
    pub viewer_vote: i16,
    /// Comments reachable in the forest
    pub comment_count: usize,
    pub comments: Vec<CommentNode>,
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn DiscussionStore>,
    ledger: VoteLedger,
}

impl CommentService {
    pub fn new(store: Arc<dyn DiscussionStore>) -> Self {
        let ledger = VoteLedger::new(store.clone());
        Self { store, ledger }
    }

    /// Create a comment on a post, optionally replying to another comment of the same post
    pub async fn create_comment(
        &self,
        author_id: Uuid,
        request: NewComment,
    ) -> ServiceResult<Comment> {
        request.validate()?;

        if self.store.find_post(request.post_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("post {}", request.post_id)));
        }

        if let Some(parent_id) = request.parent_id {
            let parent = self
                .store
                .find_comment(parent_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("parent comment {}", parent_id)))?;
            if parent.post_id != request.post_id {
                return Err(ServiceError::InvalidInput(format!(
                    "parent comment {} belongs to another post",
                    parent_id
                )));
            }
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            content: request.content,
            author_id,
            post_id: request.post_id,
            parent_id: request.parent_id,
            created_at: Utc::now(),
        };
        self.store.insert_comment(&comment).await?;

        info!(
            comment_id = %comment.id,
            post_id = %comment.post_id,
            author_id = %author_id,
            is_reply = comment.parent_id.is_some(),
            "Comment created"
        );

        Ok(comment)
    }

    /// Comment tree of a post, newest comments first, scored from the ledger
    pub async fn load_tree(&self, post_id: Uuid, viewer_id: Option<Uuid>) -> ServiceResult<CommentTree> {
        let comments = self
            .store
            .find_comments_by_post(post_id, SortOrder::Desc)
            .await?;
        let fetched = comments.len();

        let mut tree = CommentTree::build(comments);
        let scores = self
            .ledger
            .scores_for(TargetType::Comment, &tree.comment_ids(), viewer_id)
            .await?;
        tree.annotate(&scores);

        debug!(
            post_id = %post_id,
            fetched,
            in_tree = tree.len(),
            "Comment tree loaded"
        );

        Ok(tree)
    }

    /// Post, its score and its reply forest
    pub async fn load_discussion(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> ServiceResult<Discussion> {
        let post = self
            .store
            .find_post(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))?;

        let target = VoteTarget::Post(post_id);
        let score = self.ledger.compute_score(target).await?;
        let viewer_vote = match viewer_id {
            Some(viewer_id) => self.ledger.get_user_vote(viewer_id, target).await?,
            None => 0,
        };

        let tree = self.load_tree(post_id, viewer_id).await?;

        Ok(Discussion {
            post,
            score,
            viewer_vote,
            comment_count: tree.len(),
            comments: tree.to_forest(),
        })
    }
}
