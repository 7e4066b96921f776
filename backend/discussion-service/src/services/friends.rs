/// Friendship lookups used by the friends feed.
///
/// A friendship row counts in both directions: `(a, b)` makes a a friend of b
/// and b a friend of a, whichever side created it.
use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::ServiceResult;
use crate::repository::DiscussionStore;

/// Distinct friends of `user_id`, sorted by id
pub async fn friend_ids(store: &dyn DiscussionStore, user_id: Uuid) -> ServiceResult<Vec<Uuid>> {
    let rows = store.find_friendships(user_id).await?;
    let ids: BTreeSet<Uuid> = rows.iter().filter_map(|f| f.counterpart(user_id)).collect();
    Ok(ids.into_iter().collect())
}

pub async fn are_friends(store: &dyn DiscussionStore, a: Uuid, b: Uuid) -> ServiceResult<bool> {
    Ok(friend_ids(store, a).await?.contains(&b))
}
