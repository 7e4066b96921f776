pub mod comment_tree;
pub mod comments;
pub mod feed;
pub mod friends;
pub mod posts;
pub mod ranking;
pub mod votes;

pub use comment_tree::{build_tree, CommentNode, CommentTree};
pub use comments::{CommentService, Discussion};
pub use feed::{FeedCursor, FeedKind, FeedPage, FeedService};
pub use posts::PostService;
pub use ranking::{rank_by_popularity, PopularityPeriod};
pub use votes::{tally, TargetScores, VoteLedger};
