//! Popularity ranking over posts
//!
//! Score is the plain vote sum from the ledger (`votes::tally`). Ordering is
//! score descending, then newer first, then post id, so unchanged input always
//! yields the same sequence and offset pagination over it stays stable.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{Post, ScoredPost, Vote, VoteTarget};
use crate::error::ServiceError;
use crate::services::votes::tally;

/// Time window of the popular feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopularityPeriod {
    Day,
    #[default]
    Week,
    Month,
    All,
}

impl PopularityPeriod {
    /// Earliest eligible `created_at` for a ranking computed at `now`.
    /// `None` means no lower bound.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PopularityPeriod::Day => Some(now - Duration::days(1)),
            PopularityPeriod::Week => Some(now - Duration::days(7)),
            // Calendar month; falls back to 30 days where the date does not exist
            PopularityPeriod::Month => Some(
                now.checked_sub_months(Months::new(1))
                    .unwrap_or_else(|| now - Duration::days(30)),
            ),
            PopularityPeriod::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PopularityPeriod::Day => "day",
            PopularityPeriod::Week => "week",
            PopularityPeriod::Month => "month",
            PopularityPeriod::All => "all",
        }
    }
}

impl fmt::Display for PopularityPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PopularityPeriod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "today" => Ok(PopularityPeriod::Day),
            "week" => Ok(PopularityPeriod::Week),
            "month" => Ok(PopularityPeriod::Month),
            "all" => Ok(PopularityPeriod::All),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown period '{}' (expected day, week, month or all)",
                other
            ))),
        }
    }
}

/// Total order used by the popular feed
pub fn compare_ranked(a: &ScoredPost, b: &ScoredPost) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.post.created_at.cmp(&a.post.created_at))
        .then_with(|| a.post.id.cmp(&b.post.id))
}

/// Rank posts by vote score within an optional time window.
///
/// Posts created before `window_start` are excluded whatever their score.
/// Posts absent from `votes_by_post` score 0. Pure: neither input is modified.
pub fn rank_by_popularity(
    posts: &[Post],
    votes_by_post: &HashMap<Uuid, Vec<Vote>>,
    window_start: Option<DateTime<Utc>>,
) -> Vec<ScoredPost> {
    let mut ranked: Vec<ScoredPost> = posts
        .iter()
        .filter(|post| window_start.map_or(true, |start| post.created_at >= start))
        .map(|post| ScoredPost {
            post: post.clone(),
            score: votes_by_post.get(&post.id).map(|v| tally(v)).unwrap_or(0),
        })
        .collect();

    ranked.sort_by(compare_ranked);

    debug!(
        candidates = posts.len(),
        ranked = ranked.len(),
        "Popularity ranking applied"
    );

    ranked
}

/// Group votes by the post they target; comment votes are ignored.
pub fn group_post_votes(votes: Vec<Vote>) -> HashMap<Uuid, Vec<Vote>> {
    let mut grouped: HashMap<Uuid, Vec<Vote>> = HashMap::new();
    for vote in votes {
        if let VoteTarget::Post(post_id) = vote.target {
            grouped.entry(post_id).or_default().push(vote);
        }
    }
    grouped
}
