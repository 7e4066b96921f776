mod common;

use std::collections::HashMap;

use chrono::Duration;
use common::Fixture;
use discussion_service::domain::models::{TargetType, VoteRequest, VoteTarget};
use discussion_service::error::ErrorKind;
use discussion_service::services::rank_by_popularity;
use discussion_service::services::ranking::group_post_votes;
use discussion_service::repository::DiscussionStore;
use uuid::Uuid;

#[tokio::test]
async fn test_score_example_with_cleared_upvote() {
    let fx = Fixture::new();
    let post = fx.post_aged(Uuid::new_v4(), "Score me", Duration::hours(1)).await;
    let target = VoteTarget::Post(post.id);
    let ledger = &fx.engine.votes;

    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    ledger.apply_vote(alice, target, 1).await.unwrap();
    ledger.apply_vote(bob, target, 1).await.unwrap();
    ledger.apply_vote(carol, target, -1).await.unwrap();
    assert_eq!(ledger.compute_score(target).await.unwrap(), 1);

    let outcome = ledger.apply_vote(alice, target, 0).await.unwrap();
    assert_eq!(outcome.final_value, 0);
    assert_eq!(outcome.score_delta, -1);
    assert_eq!(ledger.compute_score(target).await.unwrap(), 0);
    assert_eq!(ledger.get_user_vote(alice, target).await.unwrap(), 0);
    assert_eq!(fx.store.vote_count(), 2);
}

#[tokio::test]
async fn test_repeated_vote_is_idempotent() {
    let fx = Fixture::new();
    let post = fx.post_aged(Uuid::new_v4(), "Twice", Duration::hours(1)).await;
    let target = VoteTarget::Post(post.id);
    let user = Uuid::new_v4();

    let first = fx.engine.votes.apply_vote(user, target, -1).await.unwrap();
    let second = fx.engine.votes.apply_vote(user, target, -1).await.unwrap();

    assert_eq!(first.score_delta, -1);
    assert_eq!(second.final_value, -1);
    assert_eq!(second.score_delta, 0);
    assert_eq!(fx.store.vote_count(), 1);
    assert_eq!(fx.engine.votes.compute_score(target).await.unwrap(), -1);
}

#[tokio::test]
async fn test_switching_vote_updates_the_row() {
    let fx = Fixture::new();
    let post = fx.post_aged(Uuid::new_v4(), "Flip", Duration::hours(1)).await;
    let target = VoteTarget::Post(post.id);
    let user = Uuid::new_v4();

    fx.engine.votes.apply_vote(user, target, 1).await.unwrap();
    let flipped = fx.engine.votes.apply_vote(user, target, -1).await.unwrap();

    assert_eq!(flipped.score_delta, -2);
    assert_eq!(fx.store.vote_count(), 1);
    assert_eq!(fx.engine.votes.get_user_vote(user, target).await.unwrap(), -1);
}

#[tokio::test]
async fn test_vote_request_validation() {
    let fx = Fixture::new();
    let post = fx.post_aged(Uuid::new_v4(), "Requests", Duration::hours(1)).await;
    let user = Uuid::new_v4();

    let both = VoteRequest {
        value: 1,
        post_id: Some(post.id),
        comment_id: Some(Uuid::new_v4()),
    };
    let err = fx.engine.votes.apply_vote_request(user, &both).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let out_of_range = VoteRequest {
        value: 2,
        post_id: Some(post.id),
        comment_id: None,
    };
    let err = fx
        .engine
        .votes
        .apply_vote_request(user, &out_of_range)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let missing_comment = VoteRequest {
        value: 1,
        post_id: None,
        comment_id: Some(Uuid::new_v4()),
    };
    let err = fx
        .engine
        .votes
        .apply_vote_request(user, &missing_comment)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.store.vote_count(), 0);
}

#[tokio::test]
async fn test_ledger_and_ranking_agree_on_scores() {
    let fx = Fixture::new();
    let author = Uuid::new_v4();
    let mut posts = Vec::new();
    for i in 0..4 {
        posts.push(
            fx.post_aged(author, &format!("Post {i}"), Duration::minutes(i * 10))
                .await,
        );
    }

    let voters: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let pattern: [[i64; 5]; 4] = [
        [1, 1, -1, 0, 1],
        [-1, -1, 0, 0, 1],
        [0, 0, 0, 0, 0],
        [1, 1, 1, 1, -1],
    ];
    for (post, values) in posts.iter().zip(pattern) {
        for (voter, value) in voters.iter().zip(values) {
            fx.engine
                .votes
                .apply_vote(*voter, VoteTarget::Post(post.id), value)
                .await
                .unwrap();
        }
    }

    let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
    let votes = fx
        .store
        .find_votes_for_targets(TargetType::Post, &ids)
        .await
        .unwrap();
    let ranked = rank_by_popularity(&posts, &group_post_votes(votes), None);

    let by_rank: HashMap<Uuid, i64> = ranked.iter().map(|s| (s.post.id, s.score)).collect();
    for post in &posts {
        let ledger_score = fx
            .engine
            .votes
            .compute_score(VoteTarget::Post(post.id))
            .await
            .unwrap();
        assert_eq!(by_rank[&post.id], ledger_score);
    }

    let order: Vec<i64> = ranked.iter().map(|s| s.score).collect();
    assert_eq!(order, vec![3, 2, 0, -1]);
}

#[tokio::test]
async fn test_profile_vote_listings() {
    let fx = Fixture::new();
    let author = Uuid::new_v4();
    let first = fx.post_aged(author, "First liked", Duration::hours(3)).await;
    let second = fx.post_aged(author, "Second liked", Duration::hours(2)).await;
    let disliked = fx.post_aged(author, "Disliked", Duration::hours(1)).await;
    let user = Uuid::new_v4();
    let ledger = &fx.engine.votes;

    ledger.apply_vote(user, VoteTarget::Post(first.id), 1).await.unwrap();
    ledger.apply_vote(user, VoteTarget::Post(disliked.id), -1).await.unwrap();
    ledger.apply_vote(user, VoteTarget::Post(second.id), 1).await.unwrap();

    assert_eq!(
        ledger.voted_targets(user, 1).await.unwrap(),
        vec![VoteTarget::Post(second.id), VoteTarget::Post(first.id)]
    );
    assert_eq!(
        ledger.voted_targets(user, -1).await.unwrap(),
        vec![VoteTarget::Post(disliked.id)]
    );

    ledger.apply_vote(user, VoteTarget::Post(first.id), 0).await.unwrap();
    assert_eq!(
        ledger.voted_targets(user, 1).await.unwrap(),
        vec![VoteTarget::Post(second.id)]
    );
}
