//! Threaded discussions and voting: one-vote-per-user ledger, reply trees,
//! score-ranked feeds and duplicate-free feed pagination.

pub mod config;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;

use std::sync::Arc;

use config::FeedConfig;
use repository::DiscussionStore;
use services::{CommentService, FeedService, PostService, VoteLedger};

/// All discussion services sharing one store
#[derive(Clone)]
pub struct DiscussionEngine {
    pub posts: PostService,
    pub comments: CommentService,
    pub votes: VoteLedger,
    pub feed: FeedService,
}

impl DiscussionEngine {
    pub fn new(store: Arc<dyn DiscussionStore>, feed_config: FeedConfig) -> Self {
        Self {
            posts: PostService::new(store.clone()),
            comments: CommentService::new(store.clone()),
            votes: VoteLedger::new(store.clone()),
            feed: FeedService::new(store, feed_config),
        }
    }
}
