#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use discussion_service::config::FeedConfig;
use discussion_service::domain::models::Post;
use discussion_service::repository::{DiscussionStore, InMemoryStore};
use discussion_service::DiscussionEngine;
use uuid::Uuid;

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub engine: DiscussionEngine,
    pub group_id: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let shared: Arc<dyn DiscussionStore> = store.clone();
        Self {
            engine: DiscussionEngine::new(shared, FeedConfig::default()),
            store,
            group_id: Uuid::new_v4(),
        }
    }

    /// Post by `author_id` created `age` ago
    pub async fn post_aged(&self, author_id: Uuid, title: &str, age: Duration) -> Post {
        self.post_at(author_id, title, Utc::now() - age).await
    }

    pub async fn post_at(&self, author_id: Uuid, title: &str, created_at: DateTime<Utc>) -> Post {
        self.post_with_content(author_id, title, None, created_at).await
    }

    pub async fn post_with_content(
        &self,
        author_id: Uuid,
        title: &str,
        content: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Post {
        let post = Post {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.map(str::to_string),
            author_id,
            group_id: self.group_id,
            created_at,
        };
        self.store.insert_post(&post).await.unwrap();
        post
    }
}
