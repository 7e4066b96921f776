//! Paginated feeds
//!
//! Pages are cut with plain offsets over the underlying ordering, which can
//! shift while a client scrolls (new posts, new votes). The cursor therefore
//! remembers every post id it has delivered and filters them out of later
//! pages. When filtering empties a page and the feed has more pages, the next
//! underlying page is fetched right away: callers only see an empty page at
//! the true end of the feed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FeedConfig;
use crate::domain::models::{FeedItem, Post, PostFilter, ScoredPost, SortOrder, TargetType};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::DiscussionStore;
use crate::services::friends;
use crate::services::ranking::{group_post_votes, rank_by_popularity, PopularityPeriod};
use crate::services::votes::VoteLedger;

/// Batch size when loading a whole ranking window
const RANKING_LOAD_BATCH: i64 = 500;

const MAX_SEARCH_QUERY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedKind {
    /// Every post, newest first
    Recent,
    /// Posts within the period, highest score first
    Popular { period: PopularityPeriod },
    /// Posts written by the viewer's friends, newest first
    Friends { user_id: Uuid },
    /// Posts of one group, newest first
    Group { group_id: Uuid },
    /// Posts written by one user, newest first
    Author { author_id: Uuid },
    /// Posts whose title or content contains `query` (case-insensitive), newest first
    Search { query: String },
}

impl FeedKind {
    fn validate(&self) -> ServiceResult<()> {
        if let FeedKind::Search { query } = self {
            if query.trim().is_empty() {
                return Err(ServiceError::InvalidInput(
                    "Search query is required".to_string(),
                ));
            }
            if query.chars().count() > MAX_SEARCH_QUERY_CHARS {
                return Err(ServiceError::InvalidInput(format!(
                    "Search query exceeds {} characters",
                    MAX_SEARCH_QUERY_CHARS
                )));
            }
        }
        Ok(())
    }
}

/// Pagination state of one client session over one feed.
///
/// Owned by the caller between requests, usually as the opaque token from
/// [`FeedCursor::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    pub feed: FeedKind,
    /// Next underlying page to fetch (1-indexed)
    pub page: u32,
    /// Requested page size. `FeedService` caps it at the configured maximum.
    pub page_size: u32,
    seen: HashSet<Uuid>,
}

impl FeedCursor {
    /// Cursor positioned before the first page
    pub fn new(feed: FeedKind, page_size: u32) -> ServiceResult<Self> {
        Self::at_page(feed, 1, page_size)
    }

    /// Cursor for a caller that addresses pages by number
    pub fn at_page(feed: FeedKind, page: u32, page_size: u32) -> ServiceResult<Self> {
        if page == 0 {
            return Err(ServiceError::InvalidInput("page is 1-indexed".to_string()));
        }
        if page_size == 0 {
            return Err(ServiceError::InvalidInput(
                "page size must be at least 1".to_string(),
            ));
        }
        feed.validate()?;
        Ok(Self {
            feed,
            page,
            page_size,
            seen: HashSet::new(),
        })
    }

    pub fn has_seen(&self, post_id: Uuid) -> bool {
        self.seen.contains(&post_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Opaque, URL-safe token carrying the whole cursor
    pub fn encode(&self) -> ServiceResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ServiceError::InvalidInput(format!("cursor encoding failed: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> ServiceResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| ServiceError::InvalidInput("Invalid cursor format".to_string()))?;
        let cursor: FeedCursor = serde_json::from_slice(&bytes)
            .map_err(|_| ServiceError::InvalidInput("Invalid cursor value".to_string()))?;
        if cursor.page == 0 || cursor.page_size == 0 {
            return Err(ServiceError::InvalidInput("Invalid cursor value".to_string()));
        }
        cursor.feed.validate()?;
        Ok(cursor)
    }
}

/// One page handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub has_more: bool,
    /// Size of the underlying feed when the last page was fetched
    pub total_count: i64,
}

/// Where the underlying pages of one `next_page` call come from
enum PageSource {
    /// The whole popularity window, ranked once per call
    Ranked(Vec<ScoredPost>),
    /// Store query, newest first
    Filtered(PostFilter),
    /// A feed that cannot hold posts, such as the friends feed of a user without friends
    Empty,
}

/// Feed assembly and pagination
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn DiscussionStore>,
    ledger: VoteLedger,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(store: Arc<dyn DiscussionStore>, config: FeedConfig) -> Self {
        let ledger = VoteLedger::new(store.clone());
        Self {
            store,
            ledger,
            config,
        }
    }

    /// Start a session over `feed`. `page_size` falls back to the feed's
    /// default and is capped at the configured maximum.
    pub fn open(&self, feed: FeedKind, page_size: Option<u32>) -> ServiceResult<FeedCursor> {
        let page_size = self.page_size_for(&feed, page_size);
        FeedCursor::new(feed, page_size)
    }

    /// Start a session at an explicit page number
    pub fn open_at(
        &self,
        feed: FeedKind,
        page: u32,
        page_size: Option<u32>,
    ) -> ServiceResult<FeedCursor> {
        let page_size = self.page_size_for(&feed, page_size);
        FeedCursor::at_page(feed, page, page_size)
    }

    /// Popular feed with the configured default period
    pub fn popular_default(&self) -> FeedKind {
        FeedKind::Popular {
            period: self.config.default_period,
        }
    }

    fn page_size_for(&self, feed: &FeedKind, requested: Option<u32>) -> u32 {
        let default = match feed {
            FeedKind::Friends { .. } => self.config.friends_page_size,
            _ => self.config.default_page_size,
        };
        requested
            .unwrap_or(default)
            .min(self.config.max_page_size)
    }

    /// Deliver the next page of the session and advance the cursor.
    ///
    /// Items already delivered through this cursor are never repeated. An
    /// empty `items` list comes only with `has_more == false`.
    pub async fn next_page(&self, cursor: &mut FeedCursor) -> ServiceResult<FeedPage> {
        // Cursors built without `open` or decoded from a token carry any size
        cursor.page_size = cursor.page_size.min(self.config.max_page_size);
        let source = self.page_source(&cursor.feed, Utc::now()).await?;
        let ranked = matches!(source, PageSource::Ranked(_));

        loop {
            let page = cursor.page;
            let (candidates, total_count) =
                self.fetch_page(&source, page, cursor.page_size).await?;
            let total_pages = total_pages(total_count, cursor.page_size);
            cursor.page = page.saturating_add(1);

            let fresh: Vec<ScoredPost> = candidates
                .into_iter()
                .filter(|c| cursor.seen.insert(c.post.id))
                .collect();
            let has_more = i64::from(page) < total_pages;

            if !fresh.is_empty() || !has_more {
                let items = self.annotate(fresh, ranked).await?;
                debug!(
                    feed = ?cursor.feed,
                    page,
                    total_pages,
                    delivered = items.len(),
                    has_more,
                    "Feed page served"
                );
                return Ok(FeedPage {
                    items,
                    has_more,
                    total_count,
                });
            }

            info!(
                feed = ?cursor.feed,
                page,
                "Feed page held only delivered items, advancing"
            );
        }
    }

    /// Resume a session from its token on behalf of `viewer_id`. Returns the
    /// page and the token for the next call.
    ///
    /// A friends feed token is only honoured for the user it was opened for.
    pub async fn next_page_from_token(
        &self,
        token: &str,
        viewer_id: Option<Uuid>,
    ) -> ServiceResult<(FeedPage, String)> {
        let mut cursor = FeedCursor::decode(token)?;
        if let FeedKind::Friends { user_id } = &cursor.feed {
            if viewer_id != Some(*user_id) {
                warn!(
                    viewer_id = ?viewer_id,
                    "Friends feed cursor presented by another viewer"
                );
                return Err(ServiceError::InvalidInput(
                    "Cursor was issued to another viewer".to_string(),
                ));
            }
        }
        let page = self.next_page(&mut cursor).await?;
        Ok((page, cursor.encode()?))
    }

    async fn page_source(&self, feed: &FeedKind, now: DateTime<Utc>) -> ServiceResult<PageSource> {
        let filter = match feed {
            FeedKind::Recent => PostFilter::default(),
            FeedKind::Group { group_id } => PostFilter {
                group_id: Some(*group_id),
                ..Default::default()
            },
            FeedKind::Author { author_id } => PostFilter {
                author_ids: Some(vec![*author_id]),
                ..Default::default()
            },
            FeedKind::Search { query } => PostFilter {
                text: Some(query.clone()),
                ..Default::default()
            },
            FeedKind::Friends { user_id } => {
                let friend_ids = friends::friend_ids(self.store.as_ref(), *user_id).await?;
                if friend_ids.is_empty() {
                    return Ok(PageSource::Empty);
                }
                PostFilter {
                    author_ids: Some(friend_ids),
                    ..Default::default()
                }
            }
            FeedKind::Popular { period } => {
                return Ok(PageSource::Ranked(self.rank_window(*period, now).await?));
            }
        };
        Ok(PageSource::Filtered(filter))
    }

    /// One underlying page and the feed size. Scores are filled in for the
    /// ranked source only; other feeds are scored in `annotate`.
    async fn fetch_page(
        &self,
        source: &PageSource,
        page: u32,
        page_size: u32,
    ) -> ServiceResult<(Vec<ScoredPost>, i64)> {
        let limit = i64::from(page_size);
        let skip = i64::from(page.saturating_sub(1)) * limit;

        match source {
            PageSource::Empty => Ok((Vec::new(), 0)),
            PageSource::Ranked(ranked) => {
                let slice = ranked
                    .iter()
                    .skip(skip as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect();
                Ok((slice, ranked.len() as i64))
            }
            PageSource::Filtered(filter) => {
                let (posts, total) = self
                    .store
                    .find_posts(filter, SortOrder::Desc, skip, limit)
                    .await?;
                let unscored = posts
                    .into_iter()
                    .map(|post| ScoredPost { post, score: 0 })
                    .collect();
                Ok((unscored, total))
            }
        }
    }

    /// Every post of the period, ranked by score
    async fn rank_window(
        &self,
        period: PopularityPeriod,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<ScoredPost>> {
        let window_start = period.window_start(now);
        let filter = PostFilter {
            created_since: window_start,
            ..Default::default()
        };

        let mut posts: Vec<Post> = Vec::new();
        let mut loaded: HashSet<Uuid> = HashSet::new();
        let mut skip = 0;
        loop {
            let (batch, total) = self
                .store
                .find_posts(&filter, SortOrder::Desc, skip, RANKING_LOAD_BATCH)
                .await?;
            let fetched = batch.len() as i64;
            skip += fetched;
            // Inserts between batches shift offsets; keep the first copy of a post
            posts.extend(batch.into_iter().filter(|p| loaded.insert(p.id)));
            if fetched == 0 || skip >= total {
                break;
            }
        }

        let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let votes = self
            .store
            .find_votes_for_targets(TargetType::Post, &ids)
            .await?;

        Ok(rank_by_popularity(
            &posts,
            &group_post_votes(votes),
            window_start,
        ))
    }

    /// Attach score and comment count. `ranked` posts already carry their score.
    async fn annotate(&self, posts: Vec<ScoredPost>, ranked: bool) -> ServiceResult<Vec<FeedItem>> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = posts.iter().map(|p| p.post.id).collect();
        let scores = if ranked {
            None
        } else {
            Some(self.ledger.scores_for(TargetType::Post, &ids, None).await?)
        };
        let comment_counts: HashMap<Uuid, i64> = self.store.count_comments(&ids).await?;

        Ok(posts
            .into_iter()
            .map(|scored| FeedItem {
                score: scores
                    .as_ref()
                    .map_or(scored.score, |s| s.score(scored.post.id)),
                comment_count: comment_counts.get(&scored.post.id).copied().unwrap_or(0),
                post: scored.post,
            })
            .collect())
    }
}

fn total_pages(total_count: i64, page_size: u32) -> i64 {
    let size = i64::from(page_size.max(1));
    (total_count.max(0) + size - 1) / size
}
