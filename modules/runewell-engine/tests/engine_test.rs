//! Integration tests for the progression coordinator.
//! Run against the in-memory store; no database required.

use std::sync::Arc;

use runewell_common::{
    BadgeDefinition, MetricKey, ProgressionError, ProgressionEvent, RankDefinition,
    UserProgression,
};
use runewell_engine::{
    BadgeCatalog, EngineConfig, MemoryProgressionStore, Outcome, ProgressionEngine,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn badge(id: &str, metric_key: MetricKey, target: u64, xp_reward: u64, rune_reward: u64) -> BadgeDefinition {
    BadgeDefinition {
        id: id.into(),
        metric_key,
        target,
        xp_reward,
        rune_reward,
        icon: String::new(),
        description: String::new(),
    }
}

fn ranks() -> Vec<RankDefinition> {
    vec![
        RankDefinition::new("wanderer", "Wanderer", 0),
        RankDefinition::new("adept", "Adept", 500),
        RankDefinition::new("master", "Master", 2000),
    ]
}

fn catalog() -> BadgeCatalog {
    BadgeCatalog::new(vec![
        badge("FIRST_LIKE", MetricKey::LikedProjects, 1, 10, 5),
        badge("LIKE_3", MetricKey::LikedProjects, 3, 30, 10),
        badge("FIRST_COMMENT", MetricKey::CommentCount, 1, 10, 5),
        badge("CRITIC_2", MetricKey::CommentedProjects, 2, 20, 5),
        badge("VIEWS_3", MetricKey::ViewCount, 3, 15, 0),
    ])
    .unwrap()
}

type Engine = ProgressionEngine<Arc<MemoryProgressionStore>>;

fn engine() -> (Engine, Arc<MemoryProgressionStore>) {
    let store = Arc::new(MemoryProgressionStore::new().with_ranks(ranks()));
    (ProgressionEngine::new(store.clone(), catalog()), store)
}

// =========================================================================
// Idempotence and dedup
// =========================================================================

#[tokio::test]
async fn repeated_like_is_idempotent() {
    let (engine, store) = engine();

    let first = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    assert_eq!(first.outcome, Outcome::Committed);
    let after_once = engine.snapshot("u1").await.unwrap();

    for _ in 0..5 {
        let again = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
        assert!(again.is_duplicate());
        assert!(again.newly_awarded_badges.is_empty());
        assert_eq!(again.xp, first.xp);
    }

    assert_eq!(engine.snapshot("u1").await.unwrap(), after_once);
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn duplicate_reports_unchanged_snapshot() {
    let (engine, _) = engine();
    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();

    let dup = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    assert_eq!(dup.version, 1);
    assert!(!dup.leveled_up);
    assert!(!dup.ranked_up);
    assert_eq!(dup.progression.metric_value(MetricKey::LikedProjects), 1);
}

#[tokio::test]
async fn views_are_repeatable() {
    let (engine, _) = engine();

    for _ in 0..3 {
        let r = engine.apply_event(ProgressionEvent::view("u1")).await.unwrap();
        assert_eq!(r.outcome, Outcome::Committed);
    }

    let snapshot = engine.snapshot("u1").await.unwrap();
    assert_eq!(snapshot.metric_value(MetricKey::ViewCount), 3);
    assert!(snapshot.has_badge("VIEWS_3"));
    assert_eq!(snapshot.xp, 15);
}

#[tokio::test]
async fn repeat_comment_counts_but_does_not_grow_set() {
    let (engine, _) = engine();

    engine.apply_event(ProgressionEvent::comment("u1", "p1")).await.unwrap();
    let second = engine.apply_event(ProgressionEvent::comment("u1", "p1")).await.unwrap();

    assert_eq!(second.outcome, Outcome::Committed);
    let snapshot = engine.snapshot("u1").await.unwrap();
    assert_eq!(snapshot.metric_value(MetricKey::CommentCount), 2);
    assert_eq!(snapshot.metric_value(MetricKey::CommentedProjects), 1);
    assert!(snapshot.has_badge("FIRST_COMMENT"));
    assert!(!snapshot.has_badge("CRITIC_2"));
}

#[tokio::test]
async fn comments_on_two_projects_award_set_badge() {
    let (engine, _) = engine();

    engine.apply_event(ProgressionEvent::comment("u1", "p1")).await.unwrap();
    let r = engine.apply_event(ProgressionEvent::comment("u1", "p2")).await.unwrap();

    let ids: Vec<&str> = r.newly_awarded_badges.iter().map(|b| b.badge_id.as_str()).collect();
    assert_eq!(ids, vec!["CRITIC_2"]);
}

// =========================================================================
// Removal never revokes
// =========================================================================

#[tokio::test]
async fn unlike_keeps_badge_and_xp() {
    let (engine, _) = engine();

    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    let r = engine.apply_event(ProgressionEvent::unlike("u1", "p1")).await.unwrap();

    assert_eq!(r.outcome, Outcome::Committed);
    assert_eq!(r.progression.metric_value(MetricKey::LikedProjects), 0);
    assert!(r.progression.has_badge("FIRST_LIKE"));
    assert_eq!(r.xp, 10);
}

#[tokio::test]
async fn relike_after_unlike_does_not_reaward() {
    let (engine, _) = engine();

    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    engine.apply_event(ProgressionEvent::unlike("u1", "p1")).await.unwrap();
    let r = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();

    assert_eq!(r.outcome, Outcome::Committed);
    assert!(r.newly_awarded_badges.is_empty());
    assert_eq!(r.progression.badges.len(), 1);
    assert_eq!(r.xp, 10);
}

#[tokio::test]
async fn unlike_of_unknown_target_is_duplicate() {
    let (engine, store) = engine();
    let r = engine.apply_event(ProgressionEvent::unlike("u1", "never-liked")).await.unwrap();
    assert!(r.is_duplicate());
    assert_eq!(store.commit_count(), 0);
}

// =========================================================================
// Exactly-once award and monotonicity
// =========================================================================

#[tokio::test]
async fn badges_awarded_once_with_stable_timestamp() {
    let (engine, _) = engine();

    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    let awarded_at = engine.snapshot("u1").await.unwrap().badges[0].awarded_at;

    for target in ["p2", "p3", "p4", "p5"] {
        engine.apply_event(ProgressionEvent::like("u1", target)).await.unwrap();
    }

    let snapshot = engine.snapshot("u1").await.unwrap();
    let first_like: Vec<_> = snapshot.badges.iter().filter(|b| b.badge_id == "FIRST_LIKE").collect();
    assert_eq!(first_like.len(), 1);
    assert_eq!(first_like[0].awarded_at, awarded_at);
    assert_eq!(snapshot.badges.len(), 2);
}

#[tokio::test]
async fn xp_points_and_metrics_never_decrease() {
    let (engine, _) = engine();
    let events = vec![
        ProgressionEvent::view("u1"),
        ProgressionEvent::like("u1", "p1"),
        ProgressionEvent::like("u1", "p1"),
        ProgressionEvent::comment("u1", "p1"),
        ProgressionEvent::like("u1", "p2"),
        ProgressionEvent::view("u1"),
        ProgressionEvent::comment("u1", "p2"),
        ProgressionEvent::like("u1", "p3"),
        ProgressionEvent::view("u1"),
    ];

    let mut last = UserProgression::new("u1");
    for event in events {
        let r = engine.apply_event(event).await.unwrap();
        let now = r.progression;
        assert!(now.xp >= last.xp);
        assert!(now.points >= last.points);
        for key in MetricKey::ALL {
            assert!(now.metric_value(key) >= last.metric_value(key), "{key} decreased");
        }
        assert!(now.badges.len() >= last.badges.len());
        last = now;
    }

    assert_eq!(last.xp, 10 + 30 + 10 + 20 + 15);
    assert_eq!(last.points, 5 + 10 + 5 + 5);
}

#[tokio::test]
async fn one_event_can_cross_several_thresholds() {
    let (engine, store) = engine();

    // Historical likes imported without evaluation.
    let mut imported = UserProgression::new("u1");
    imported.record_set_event(MetricKey::LikedProjects, "a").unwrap();
    imported.record_set_event(MetricKey::LikedProjects, "b").unwrap();
    store.seed(imported);

    let r = engine.apply_event(ProgressionEvent::like("u1", "c")).await.unwrap();
    let ids: Vec<&str> = r.newly_awarded_badges.iter().map(|b| b.badge_id.as_str()).collect();
    assert_eq!(ids, vec!["FIRST_LIKE", "LIKE_3"]);
    assert_eq!(r.xp, 40);
}

// =========================================================================
// Level and rank cascade
// =========================================================================

#[tokio::test]
async fn reward_crosses_two_levels_in_one_transaction() {
    let store = Arc::new(MemoryProgressionStore::new().with_ranks(vec![
        RankDefinition::new("wanderer", "Wanderer", 0),
        RankDefinition::new("adept", "Adept", 200),
    ]));
    let catalog = BadgeCatalog::new(vec![badge("BIG", MetricKey::LikedProjects, 1, 150, 0)]).unwrap();
    let engine = ProgressionEngine::new(store.clone(), catalog);

    store.seed(UserProgression {
        xp: 60,
        ..UserProgression::new("u1")
    });

    let r = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    assert_eq!(r.xp, 210);
    assert_eq!(r.new_level, 3);
    assert_eq!(r.progress_in_level, 10);
    assert!(r.leveled_up);
    assert!(r.ranked_up);
    assert_eq!(r.new_rank.unwrap().current.name, "Adept");
}

#[tokio::test]
async fn rank_follows_catalog_edits_between_events() {
    let (engine, store) = engine();
    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();

    store.set_ranks(vec![
        RankDefinition::new("wanderer", "Wanderer", 0),
        RankDefinition::new("sprout", "Sprout", 5),
    ]);
    let r = engine.apply_event(ProgressionEvent::view("u1")).await.unwrap();
    assert_eq!(r.new_rank.unwrap().current.id, "sprout");
}

#[tokio::test]
async fn profile_derives_level_and_rank() {
    let (engine, store) = engine();
    store.seed(UserProgression {
        xp: 750,
        ..UserProgression::new("u1")
    });

    let profile = engine.profile("u1").await.unwrap();
    assert_eq!(profile.level.level, 8);
    assert_eq!(profile.level.progress, 50);
    let rank = profile.rank.unwrap();
    assert_eq!(rank.current.name, "Adept");
    assert_eq!(rank.next.unwrap().name, "Master");
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fifty_concurrent_likes_lose_nothing() {
    let (engine, _) = engine();

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .apply_event(ProgressionEvent::like("u1", format!("p{i}")))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let snapshot = engine.snapshot("u1").await.unwrap();
    assert_eq!(snapshot.metric_value(MetricKey::LikedProjects), 50);
    assert_eq!(snapshot.badges.len(), 2);
    assert_eq!(snapshot.xp, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_award_once() {
    let (engine, store) = engine();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply_event(ProgressionEvent::like("u1", "p1")).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let committed = results.iter().filter(|r| r.outcome == Outcome::Committed).count();
    assert_eq!(committed, 1);
    assert_eq!(store.commit_count(), 1);
    assert_eq!(engine.snapshot("u1").await.unwrap().xp, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn users_progress_independently() {
    let (engine, _) = engine();

    let tasks: Vec<_> = (0..10)
        .flat_map(|u| (0..5).map(move |p| (u, p)))
        .map(|(u, p)| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .apply_event(ProgressionEvent::like(format!("u{u}"), format!("p{p}")))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    for u in 0..10 {
        let snapshot = engine.snapshot(&format!("u{u}")).await.unwrap();
        assert_eq!(snapshot.metric_value(MetricKey::LikedProjects), 5);
    }
}

#[tokio::test]
async fn dropped_caller_still_commits() {
    let (engine, store) = engine();

    {
        let mut pending = Box::pin(engine.apply_event(ProgressionEvent::like("u1", "p1")));
        assert!(futures::poll!(pending.as_mut()).is_pending());
    }

    for _ in 0..100 {
        if store.commit_count() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let snapshot = engine.snapshot("u1").await.unwrap();
    assert_eq!(snapshot.metric_value(MetricKey::LikedProjects), 1);
    assert!(snapshot.has_badge("FIRST_LIKE"));
    assert_eq!(snapshot.xp, 10);

    // A retry after the dropped call lands on the dedup path.
    let retry = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    assert!(retry.is_duplicate());
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn timed_out_caller_still_commits() {
    let (engine, store) = engine();

    let _ = tokio::time::timeout(
        std::time::Duration::ZERO,
        engine.apply_event(ProgressionEvent::comment("u1", "p1")),
    )
    .await;

    for _ in 0..100 {
        if store.commit_count() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let snapshot = engine.snapshot("u1").await.unwrap();
    assert_eq!(snapshot.metric_value(MetricKey::CommentCount), 1);
    assert!(snapshot.has_badge("FIRST_COMMENT"));
}

// =========================================================================
// Failure semantics
// =========================================================================

#[tokio::test]
async fn storage_failure_leaves_prior_state() {
    let (engine, store) = engine();
    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    let before = engine.snapshot("u1").await.unwrap();

    store.fail_next_commits(1);
    let err = engine
        .apply_event(ProgressionEvent::like("u1", "p2"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressionError::Storage(_)));
    assert!(err.is_retryable());
    assert_eq!(engine.snapshot("u1").await.unwrap(), before);

    // Retrying the same event succeeds and awards nothing twice.
    let r = engine.apply_event(ProgressionEvent::like("u1", "p2")).await.unwrap();
    assert_eq!(r.outcome, Outcome::Committed);
    assert_eq!(r.progression.metric_value(MetricKey::LikedProjects), 2);
    assert_eq!(r.progression.badges.len(), 1);
}

#[tokio::test]
async fn conflicts_are_retried_transparently() {
    let (engine, store) = engine();
    store.conflict_next_commits(2);

    let r = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    assert_eq!(r.outcome, Outcome::Committed);
    assert_eq!(r.version, 3);
    assert_eq!(r.xp, 10);
}

#[tokio::test]
async fn exhausted_retries_surface_transient_failure() {
    let store = Arc::new(MemoryProgressionStore::new());
    let engine = ProgressionEngine::with_config(
        store.clone(),
        catalog(),
        EngineConfig {
            max_conflict_retries: 2,
        },
    );
    store.conflict_next_commits(3);

    let err = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap_err();
    assert!(matches!(
        err,
        ProgressionError::TransientFailure { attempts: 3, .. }
    ));
    assert!(err.is_retryable());
    assert_eq!(store.commit_count(), 0);
    assert!(engine.snapshot("u1").await.unwrap().badges.is_empty());
}

#[tokio::test]
async fn unknown_action_is_rejected_at_parse() {
    let err = ProgressionEvent::parse("u1", "share", Some("p1")).unwrap_err();
    assert!(matches!(err, ProgressionError::UnknownMetricKey(_)));
    assert!(!err.is_retryable());
}

// =========================================================================
// Reconcile and grants
// =========================================================================

#[tokio::test]
async fn reconcile_awards_badges_added_after_the_fact() {
    let store = Arc::new(MemoryProgressionStore::new());
    let old = ProgressionEngine::new(
        store.clone(),
        BadgeCatalog::new(vec![badge("FIRST_LIKE", MetricKey::LikedProjects, 1, 10, 5)]).unwrap(),
    );
    for target in ["p1", "p2", "p3"] {
        old.apply_event(ProgressionEvent::like("u1", target)).await.unwrap();
    }

    // Redeploy with a richer catalog.
    let new = ProgressionEngine::new(store.clone(), catalog());
    let r = new.reconcile("u1").await.unwrap();
    let ids: Vec<&str> = r.newly_awarded_badges.iter().map(|b| b.badge_id.as_str()).collect();
    assert_eq!(ids, vec!["LIKE_3"]);
    assert_eq!(r.xp, 40);

    let again = new.reconcile("u1").await.unwrap();
    assert!(again.newly_awarded_badges.is_empty());
}

#[tokio::test]
async fn grant_recomputes_level_without_touching_badges() {
    let (engine, _) = engine();
    engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();

    let r = engine.grant("u1", 500, 20).await.unwrap();
    assert_eq!(r.xp, 510);
    assert_eq!(r.points, 25);
    assert_eq!(r.new_level, 6);
    assert!(r.leveled_up);
    assert!(r.ranked_up);
    assert_eq!(r.progression.badges.len(), 1);

    let down = engine.grant("u1", -10_000, 0).await.unwrap();
    assert_eq!(down.xp, 0);
    assert!(!down.ranked_up);
}

// =========================================================================
// Catalog access
// =========================================================================

#[tokio::test]
async fn catalog_listings_are_read_only_views() {
    let (engine, _) = engine();
    let ids: Vec<&str> = engine.list_badge_definitions().iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["FIRST_LIKE", "LIKE_3", "FIRST_COMMENT", "CRITIC_2", "VIEWS_3"]);

    let ranks = engine.list_ranks().await.unwrap();
    assert_eq!(ranks.len(), 3);
    assert_eq!(ranks[0].id, "wanderer");
}

#[tokio::test]
async fn result_serializes_camel_case() {
    let (engine, _) = engine();
    let r = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
    let json = serde_json::to_value(&r).unwrap();
    assert_eq!(json["outcome"], "committed");
    assert_eq!(json["newLevel"], 1);
    assert_eq!(json["newlyAwardedBadges"][0]["badgeId"], "FIRST_LIKE");
    assert_eq!(json["updatedMetric"][0]["key"], "likedProjects");
    assert_eq!(json["newRank"]["current"]["id"], "wanderer");
}
