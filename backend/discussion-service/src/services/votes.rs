/// Vote ledger - one vote per (user, target), scores derived by summation
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::{TargetType, Vote, VoteOutcome, VoteRequest, VoteTarget, VoteValue};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::DiscussionStore;

/// Sum of vote values. The single scoring rule shared by the ledger and the
/// popularity ranker.
pub fn tally<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> i64 {
    votes.into_iter().map(|v| i64::from(v.value)).sum()
}

/// Scores keyed by target id. Targets without votes are absent.
pub fn tally_by_target<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> HashMap<Uuid, i64> {
    let mut scores = HashMap::new();
    for vote in votes {
        *scores.entry(vote.target.id()).or_insert(0) += i64::from(vote.value);
    }
    scores
}

/// Scores of a batch of targets plus one viewer's own votes on them
#[derive(Debug, Clone, Default)]
pub struct TargetScores {
    pub scores: HashMap<Uuid, i64>,
    pub viewer_votes: HashMap<Uuid, i16>,
}

impl TargetScores {
    pub fn score(&self, target_id: Uuid) -> i64 {
        self.scores.get(&target_id).copied().unwrap_or(0)
    }

    pub fn viewer_vote(&self, target_id: Uuid) -> i16 {
        self.viewer_votes.get(&target_id).copied().unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<dyn DiscussionStore>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn DiscussionStore>) -> Self {
        Self { store }
    }

    /// Apply a vote request carrying the optional post/comment id pair.
    pub async fn apply_vote_request(
        &self,
        user_id: Uuid,
        request: &VoteRequest,
    ) -> ServiceResult<VoteOutcome> {
        let target = request.target()?;
        self.apply_vote(user_id, target, request.value).await
    }

    /// Set the user's vote on `target` to `requested_value` (-1, 0 or 1).
    ///
    /// Repeating the current value changes nothing; clearing a vote requires an
    /// explicit 0. A write that loses a race against a concurrent request for
    /// the same (user, target) is retried once, then surfaces as
    /// `ConflictRetryable`.
    pub async fn apply_vote(
        &self,
        user_id: Uuid,
        target: VoteTarget,
        requested_value: i64,
    ) -> ServiceResult<VoteOutcome> {
        let requested = VoteValue::try_from(requested_value)?;
        self.ensure_target_exists(target).await?;

        match self.write_vote(user_id, target, requested).await {
            Err(ServiceError::ConflictRetryable(reason)) => {
                warn!(
                    user_id = %user_id,
                    target = %target,
                    reason = %reason,
                    "Vote write raced a concurrent request, retrying once"
                );
                self.write_vote(user_id, target, requested).await
            }
            result => result,
        }
    }

    /// Sum of stored vote values; 0 for a target nobody voted on.
    pub async fn compute_score(&self, target: VoteTarget) -> ServiceResult<i64> {
        let votes = self.store.find_votes(target).await?;
        Ok(tally(&votes))
    }

    /// The user's stored vote on `target`, 0 when there is none.
    pub async fn get_user_vote(&self, user_id: Uuid, target: VoteTarget) -> ServiceResult<i16> {
        let vote = self.store.find_user_vote(user_id, target).await?;
        Ok(vote.map(|v| v.value).unwrap_or(0))
    }

    /// Targets `user_id` voted on with `value` (1 or -1), most recent vote first.
    /// Backs the "upvoted" and "downvoted" listings of a profile.
    pub async fn voted_targets(&self, user_id: Uuid, value: i64) -> ServiceResult<Vec<VoteTarget>> {
        let value = match VoteValue::try_from(value)? {
            VoteValue::Clear => return Err(ServiceError::InvalidValue(0)),
            voted => voted.as_i16(),
        };
        let votes = self.store.find_votes_by_user(user_id, value).await?;
        Ok(votes.into_iter().map(|v| v.target).collect())
    }

    /// Batch scores for many targets of one type, with the viewer's votes when given.
    pub async fn scores_for(
        &self,
        target_type: TargetType,
        target_ids: &[Uuid],
        viewer_id: Option<Uuid>,
    ) -> ServiceResult<TargetScores> {
        if target_ids.is_empty() {
            return Ok(TargetScores::default());
        }

        let votes = self
            .store
            .find_votes_for_targets(target_type, target_ids)
            .await?;

        let viewer_votes = match viewer_id {
            Some(viewer_id) => votes
                .iter()
                .filter(|v| v.user_id == viewer_id)
                .map(|v| (v.target.id(), v.value))
                .collect(),
            None => HashMap::new(),
        };

        Ok(TargetScores {
            scores: tally_by_target(&votes),
            viewer_votes,
        })
    }

    async fn ensure_target_exists(&self, target: VoteTarget) -> ServiceResult<()> {
        let exists = match target {
            VoteTarget::Post(id) => self.store.find_post(id).await?.is_some(),
            VoteTarget::Comment(id) => self.store.find_comment(id).await?.is_some(),
        };

        if exists {
            Ok(())
        } else {
            Err(ServiceError::TargetNotFound(target))
        }
    }

    /// One read-modify-write pass over the ledger row for (user, target).
    async fn write_vote(
        &self,
        user_id: Uuid,
        target: VoteTarget,
        requested: VoteValue,
    ) -> ServiceResult<VoteOutcome> {
        let existing = self.store.find_user_vote(user_id, target).await?;
        let previous = existing.as_ref().map(|v| v.value).unwrap_or(0);
        let value = requested.as_i16();

        match (existing, requested) {
            (None, VoteValue::Clear) => {}
            (None, _) => {
                let vote = Vote {
                    id: Uuid::new_v4(),
                    user_id,
                    target,
                    value,
                };
                self.store.insert_vote(&vote).await?;
            }
            (Some(vote), VoteValue::Clear) => {
                if !self.store.delete_vote(vote.id).await? {
                    return Err(ServiceError::ConflictRetryable(format!(
                        "vote {} vanished before delete",
                        vote.id
                    )));
                }
            }
            (Some(vote), _) if vote.value == value => {}
            (Some(vote), _) => {
                if !self.store.update_vote(vote.id, value).await? {
                    return Err(ServiceError::ConflictRetryable(format!(
                        "vote {} vanished before update",
                        vote.id
                    )));
                }
            }
        }

        debug!(
            user_id = %user_id,
            target = %target,
            previous,
            value,
            "Vote applied"
        );

        Ok(VoteOutcome {
            final_value: value,
            score_delta: i64::from(value) - i64::from(previous),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Post;
    use crate::error::{ErrorKind, StoreError};
    use crate::repository::MockDiscussionStore;
    use chrono::Utc;

    fn post(id: Uuid) -> Post {
        Post {
            id,
            title: "Mocked post".to_string(),
            content: None,
            author_id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn vote(user_id: Uuid, target: VoteTarget, value: i16) -> Vote {
        Vote {
            id: Uuid::new_v4(),
            user_id,
            target,
            value,
        }
    }

    #[test]
    fn test_tally_sums_values() {
        let target = VoteTarget::Post(Uuid::new_v4());
        let votes = vec![
            vote(Uuid::new_v4(), target, 1),
            vote(Uuid::new_v4(), target, 1),
            vote(Uuid::new_v4(), target, -1),
        ];
        assert_eq!(tally(&votes), 1);
        assert_eq!(tally(&[]), 0);
    }

    #[tokio::test]
    async fn test_invalid_value_rejected_before_storage() {
        // No expectations: any store call would panic.
        let ledger = VoteLedger::new(Arc::new(MockDiscussionStore::new()));
        let err = ledger
            .apply_vote(Uuid::new_v4(), VoteTarget::Post(Uuid::new_v4()), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidValue(2)));
    }

    #[tokio::test]
    async fn test_invalid_target_rejected_before_storage() {
        let ledger = VoteLedger::new(Arc::new(MockDiscussionStore::new()));
        let request = VoteRequest {
            value: 1,
            post_id: Some(Uuid::new_v4()),
            comment_id: Some(Uuid::new_v4()),
        };
        let err = ledger
            .apply_vote_request(Uuid::new_v4(), &request)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found() {
        let mut store = MockDiscussionStore::new();
        store.expect_find_comment().returning(|_| Ok(None));
        let ledger = VoteLedger::new(Arc::new(store));

        let target = VoteTarget::Comment(Uuid::new_v4());
        let err = ledger
            .apply_vote(Uuid::new_v4(), target, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TargetNotFound(t) if t == target));
    }

    #[tokio::test]
    async fn test_insert_race_is_retried_once() {
        let post_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let target = VoteTarget::Post(post_id);
        let winner = vote(user_id, target, -1);

        let mut store = MockDiscussionStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_find_post()
            .returning(move |id| Ok(Some(post(id))));
        // First pass: no row yet, but a concurrent request inserts one first.
        store
            .expect_find_user_vote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        store
            .expect_insert_vote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StoreError::UniqueViolation("uq_votes_user_target".into())));
        // Retry: the concurrent row is visible and gets updated.
        let seen = winner.clone();
        store
            .expect_find_user_vote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(seen.clone())));
        let winner_id = winner.id;
        store
            .expect_update_vote()
            .withf(move |id, value| *id == winner_id && *value == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));

        let ledger = VoteLedger::new(Arc::new(store));
        let outcome = ledger.apply_vote(user_id, target, 1).await.unwrap();
        assert_eq!(outcome.final_value, 1);
        assert_eq!(outcome.score_delta, 2);
    }

    #[tokio::test]
    async fn test_second_conflict_surfaces_retryable() {
        let mut store = MockDiscussionStore::new();
        store
            .expect_find_post()
            .returning(move |id| Ok(Some(post(id))));
        store
            .expect_find_user_vote()
            .times(2)
            .returning(|_, _| Ok(None));
        store
            .expect_insert_vote()
            .times(2)
            .returning(|_| Err(StoreError::UniqueViolation("uq_votes_user_target".into())));

        let ledger = VoteLedger::new(Arc::new(store));
        let err = ledger
            .apply_vote(Uuid::new_v4(), VoteTarget::Post(Uuid::new_v4()), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRetryable);
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_retried() {
        let mut store = MockDiscussionStore::new();
        store
            .expect_find_post()
            .returning(move |id| Ok(Some(post(id))));
        store
            .expect_find_user_vote()
            .times(1)
            .returning(|_, _| Err(StoreError::Internal("connection reset".into())));

        let ledger = VoteLedger::new(Arc::new(store));
        let err = ledger
            .apply_vote(Uuid::new_v4(), VoteTarget::Post(Uuid::new_v4()), -1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_vanished_row_on_delete_is_retried() {
        let user_id = Uuid::new_v4();
        let target = VoteTarget::Post(Uuid::new_v4());
        let stale = vote(user_id, target, 1);

        let mut store = MockDiscussionStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_find_post()
            .returning(move |id| Ok(Some(post(id))));
        store
            .expect_find_user_vote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(stale.clone())));
        store
            .expect_delete_vote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));
        store
            .expect_find_user_vote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));

        let ledger = VoteLedger::new(Arc::new(store));
        let outcome = ledger.apply_vote(user_id, target, 0).await.unwrap();
        assert_eq!(outcome.final_value, 0);
        assert_eq!(outcome.score_delta, 0);
    }

    #[tokio::test]
    async fn test_compute_score_without_votes_is_zero() {
        let mut store = MockDiscussionStore::new();
        store.expect_find_votes().returning(|_| Ok(vec![]));
        let ledger = VoteLedger::new(Arc::new(store));

        let score = ledger
            .compute_score(VoteTarget::Comment(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(score, 0);
    }

    #[tokio::test]
    async fn test_voted_targets_keeps_store_order() {
        let user_id = Uuid::new_v4();
        let newer = VoteTarget::Comment(Uuid::new_v4());
        let older = VoteTarget::Post(Uuid::new_v4());
        let rows = vec![vote(user_id, newer, -1), vote(user_id, older, -1)];

        let mut store = MockDiscussionStore::new();
        store
            .expect_find_votes_by_user()
            .withf(move |u, value| *u == user_id && *value == -1)
            .return_once(move |_, _| Ok(rows));
        let ledger = VoteLedger::new(Arc::new(store));

        let targets = ledger.voted_targets(user_id, -1).await.unwrap();
        assert_eq!(targets, vec![newer, older]);
    }

    #[tokio::test]
    async fn test_voted_targets_rejects_zero_and_out_of_range() {
        let ledger = VoteLedger::new(Arc::new(MockDiscussionStore::new()));
        let user_id = Uuid::new_v4();
        assert!(matches!(
            ledger.voted_targets(user_id, 0).await,
            Err(ServiceError::InvalidValue(0))
        ));
        assert!(matches!(
            ledger.voted_targets(user_id, 3).await,
            Err(ServiceError::InvalidValue(3))
        ));
    }
}
