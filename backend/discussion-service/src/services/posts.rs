/// Post service - post creation and lookup
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::{NewPost, Post};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::DiscussionStore;

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn DiscussionStore>,
}

impl PostService {
    pub fn new(store: Arc<dyn DiscussionStore>) -> Self {
        Self { store }
    }

    /// Create a post in a group. Group membership is checked by the caller.
    pub async fn create_post(&self, author_id: Uuid, request: NewPost) -> ServiceResult<Post> {
        request.validate()?;

        let post = Post {
            id: Uuid::new_v4(),
            title: request.title,
            content: request.content.filter(|c| !c.is_empty()),
            author_id,
            group_id: request.group_id,
            created_at: Utc::now(),
        };
        self.store.insert_post(&post).await?;

        info!(post_id = %post.id, group_id = %post.group_id, "Post created");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> ServiceResult<Post> {
        self.store
            .find_post(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::repository::InMemoryStore;

    #[tokio::test]
    async fn test_create_and_get_post() {
        let service = PostService::new(Arc::new(InMemoryStore::new()));
        let author = Uuid::new_v4();
        let post = service
            .create_post(
                author,
                NewPost {
                    title: "First post".to_string(),
                    content: Some(String::new()),
                    group_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap();

        assert_eq!(post.author_id, author);
        assert_eq!(post.content, None);
        assert_eq!(service.get_post(post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn test_short_title_is_invalid_input() {
        let service = PostService::new(Arc::new(InMemoryStore::new()));
        let err = service
            .create_post(
                Uuid::new_v4(),
                NewPost {
                    title: "no".to_string(),
                    content: None,
                    group_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let service = PostService::new(Arc::new(InMemoryStore::new()));
        let err = service.get_post(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
