//! The progression transaction coordinator.
//!
//! Load → dedup → apply metric → evaluate badges → reward → recompute
//! level/rank → commit. Every step runs on a private copy of the aggregate;
//! the single compare-and-swap commit at the end is the only write, so a
//! failure anywhere leaves the committed state untouched.

use std::sync::Arc;

use chrono::Utc;
use runewell_common::{
    AwardedBadge, BadgeDefinition, MetricKey, ProgressionError, ProgressionEvent, RankDefinition,
    SetOp, UserProgression,
};
use runewell_common::config::DEFAULT_MAX_CONFLICT_RETRIES;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::BadgeCatalog;
use crate::evaluator;
use crate::level::{self, LevelProgress};
use crate::locks::UserLocks;
use crate::rank::{self, RankStanding};
use crate::traits::ProgressionStore;

type Result<T> = std::result::Result<T, ProgressionError>;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Transaction stages, in order. The last two are terminal aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    DedupChecked,
    MetricApplied,
    BadgesEvaluated,
    RewardsApplied,
    RankRecomputed,
    Committed,
    RejectedDuplicate,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Committed,
    /// The event was already counted. Nothing changed; safe to treat as success.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub key: MetricKey,
    pub value: u64,
}

/// What a transaction did, for the caller's notification fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionResult {
    pub user_id: String,
    pub outcome: Outcome,
    pub updated_metric: Vec<MetricValue>,
    pub newly_awarded_badges: Vec<AwardedBadge>,
    pub xp: u64,
    pub points: u64,
    pub new_level: u64,
    pub progress_in_level: u64,
    pub new_rank: Option<RankStanding>,
    pub leveled_up: bool,
    pub ranked_up: bool,
    pub version: u64,
    pub progression: UserProgression,
}

impl ProgressionResult {
    pub fn is_duplicate(&self) -> bool {
        self.outcome == Outcome::Duplicate
    }
}

/// Read-only view for profile pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionProfile {
    pub progression: UserProgression,
    pub level: LevelProgress,
    pub rank: Option<RankStanding>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Conflict retries after the first attempt before `TransientFailure`.
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

enum Command {
    Apply(ProgressionEvent),
    Reconcile,
    Grant { xp_delta: i64, rune_delta: i64 },
}

/// The only write path for user progression.
///
/// Cheap to clone; clones share the store, catalog and lock registry.
pub struct ProgressionEngine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for ProgressionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct EngineInner<S> {
    store: S,
    catalog: BadgeCatalog,
    locks: UserLocks,
    config: EngineConfig,
}

impl<S: ProgressionStore + 'static> ProgressionEngine<S> {
    pub fn new(store: S, catalog: BadgeCatalog) -> Self {
        Self::with_config(store, catalog, EngineConfig::default())
    }

    pub fn with_config(store: S, catalog: BadgeCatalog, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                catalog,
                locks: UserLocks::new(),
                config,
            }),
        }
    }

    /// Apply one activity event atomically and idempotently.
    ///
    /// Once accepted the transaction runs to commit or failure on its own
    /// task; dropping the returned future does not abort it. Retrying after
    /// a timeout is safe.
    pub async fn apply_event(&self, event: ProgressionEvent) -> Result<ProgressionResult> {
        event.validate()?;
        let user_id = event.user_id.clone();
        self.spawn(user_id, Command::Apply(event)).await
    }

    /// Award every badge the persisted metrics qualify for but the user does
    /// not own. Used after a catalog change or a bulk import.
    pub async fn reconcile(&self, user_id: &str) -> Result<ProgressionResult> {
        validate_user_id(user_id)?;
        self.spawn(user_id.to_string(), Command::Reconcile).await
    }

    /// Explicit external XP/rune adjustment. Balances clamp at zero; badges
    /// are untouched.
    pub async fn grant(&self, user_id: &str, xp_delta: i64, rune_delta: i64) -> Result<ProgressionResult> {
        validate_user_id(user_id)?;
        self.spawn(user_id.to_string(), Command::Grant { xp_delta, rune_delta })
            .await
    }

    pub async fn snapshot(&self, user_id: &str) -> Result<UserProgression> {
        validate_user_id(user_id)?;
        Ok(self.inner.store.load(user_id).await?.value)
    }

    pub async fn profile(&self, user_id: &str) -> Result<ProgressionProfile> {
        let progression = self.snapshot(user_id).await?;
        let ranks = self.inner.store.list_ranks().await?;
        Ok(ProgressionProfile {
            level: LevelProgress::from_xp(progression.xp),
            rank: rank::resolve(progression.xp, &ranks),
            progression,
        })
    }

    pub async fn list_ranks(&self) -> Result<Vec<RankDefinition>> {
        Ok(self.inner.store.list_ranks().await?)
    }

    pub fn list_badge_definitions(&self) -> &[BadgeDefinition] {
        self.inner.catalog.all()
    }

    async fn spawn(&self, user_id: String, command: Command) -> Result<ProgressionResult> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.execute(&user_id, command).await })
            .await
            .map_err(|e| ProgressionError::Aborted(e.to_string()))?
    }
}

impl<S: ProgressionStore> EngineInner<S> {
    /// Serialize on the user, then attempt until commit, a non-conflict
    /// failure, or retries run out.
    async fn execute(&self, user_id: &str, command: Command) -> Result<ProgressionResult> {
        let _guard = self.locks.lock(user_id).await;
        let max_attempts = self.config.max_conflict_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(user_id, &command).await {
                Ok(result) => return Ok(result),
                Err(ProgressionError::ConcurrencyConflict { expected, found, .. })
                    if attempt < max_attempts =>
                {
                    debug!(user_id, attempt, expected, found, "Progression conflict, retrying");
                }
                Err(ProgressionError::ConcurrencyConflict { .. }) => {
                    stage(user_id, Stage::Failed);
                    warn!(user_id, attempts = attempt, "Progression retries exhausted");
                    return Err(ProgressionError::TransientFailure {
                        user_id: user_id.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    stage(user_id, Stage::Failed);
                    warn!(user_id, error = %e, "Progression transaction failed");
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, user_id: &str, command: &Command) -> Result<ProgressionResult> {
        let loaded = self.store.load(user_id).await?;
        let ranks = self.store.list_ranks().await?;
        stage(user_id, Stage::Received);

        let before = loaded.value;
        let standing_before = Standing::at(before.xp, &ranks);
        let mut draft = before.clone();
        let mut updated = Vec::new();
        let mut to_evaluate = Vec::new();
        let mut evaluate_everything = false;

        match command {
            Command::Apply(event) => {
                let effects = event.action_type.effects();
                let mut set_changed = false;

                // 1. Dedup: set membership decides whether this event counts.
                if let Some((key, op)) = effects.set {
                    let target = event.target_id.as_deref().ok_or_else(|| {
                        ProgressionError::InvalidEvent(format!(
                            "{} requires a target id",
                            event.action_type
                        ))
                    })?;
                    set_changed = match op {
                        SetOp::Insert => draft.record_set_event(key, target)?,
                        SetOp::Remove => draft.remove_set_event(key, target)?,
                    };
                    updated.push(MetricValue {
                        key,
                        value: draft.metric_value(key),
                    });
                    if set_changed && op == SetOp::Insert {
                        to_evaluate.push(key);
                    }
                }
                stage(user_id, Stage::DedupChecked);

                if !set_changed && effects.counter.is_none() {
                    stage(user_id, Stage::RejectedDuplicate);
                    debug!(
                        user_id,
                        action = %event.action_type,
                        target = event.target_id.as_deref().unwrap_or(""),
                        "Duplicate progression event ignored"
                    );
                    return Ok(build_result(
                        Outcome::Duplicate,
                        &standing_before,
                        standing_before.clone(),
                        before,
                        loaded.version,
                        updated,
                        Vec::new(),
                    ));
                }

                // 2. Counters always count.
                if let Some(key) = effects.counter {
                    let value = draft.record_counter_event(key)?;
                    updated.push(MetricValue { key, value });
                    to_evaluate.push(key);
                }
                stage(user_id, Stage::MetricApplied);
            }
            Command::Reconcile => evaluate_everything = true,
            Command::Grant {
                xp_delta,
                rune_delta,
            } => {
                draft.apply_grant(*xp_delta, *rune_delta);
                info!(user_id, xp_delta, rune_delta, "External grant applied");
            }
        }

        // 3. Evaluate against the draft's own values and owned badges, never
        // against deltas, so a retried transaction re-derives the same awards.
        let qualifying: Vec<BadgeDefinition> = if evaluate_everything {
            evaluator::evaluate_all(&self.catalog, &draft)
        } else {
            evaluator::evaluate_metrics(&self.catalog, &draft, &to_evaluate)
        }
        .into_iter()
        .cloned()
        .collect();
        stage(user_id, Stage::BadgesEvaluated);

        // 4. Badge entry and rewards land together.
        let awarded_at = Utc::now();
        let mut rewarded: Vec<&BadgeDefinition> = Vec::new();
        for badge in &qualifying {
            if draft.award_badge(badge, awarded_at) {
                rewarded.push(badge);
            }
        }
        stage(user_id, Stage::RewardsApplied);

        // 5. Level and rank follow from the reward-inflated XP.
        let standing = Standing::at(draft.xp, &ranks);
        debug!(
            user_id,
            level = standing.level,
            rank = standing.rank.as_ref().map(|r| r.current.id.as_str()).unwrap_or(""),
            "Level and rank recomputed"
        );
        stage(user_id, Stage::RankRecomputed);

        let version = if draft == before {
            loaded.version
        } else {
            self.store.commit(&draft, loaded.version).await?
        };
        stage(user_id, Stage::Committed);

        for badge in &rewarded {
            info!(
                user_id,
                badge_id = badge.id.as_str(),
                xp_reward = badge.xp_reward,
                rune_reward = badge.rune_reward,
                "Badge awarded"
            );
        }

        let awarded = rewarded
            .iter()
            .map(|badge| AwardedBadge {
                badge_id: badge.id.clone(),
                awarded_at,
            })
            .collect();

        Ok(build_result(
            Outcome::Committed,
            &standing_before,
            standing,
            draft,
            version,
            updated,
            awarded,
        ))
    }
}

/// Level and rank derived from an XP total.
#[derive(Debug, Clone)]
struct Standing {
    level: u64,
    progress: u64,
    rank: Option<RankStanding>,
    position: Option<usize>,
}

impl Standing {
    fn at(xp: u64, ranks: &[RankDefinition]) -> Self {
        Self {
            level: level::level(xp),
            progress: level::progress_in_level(xp),
            rank: rank::resolve(xp, ranks),
            position: rank::position(xp, ranks),
        }
    }
}

fn build_result(
    outcome: Outcome,
    before: &Standing,
    after: Standing,
    progression: UserProgression,
    version: u64,
    updated_metric: Vec<MetricValue>,
    newly_awarded_badges: Vec<AwardedBadge>,
) -> ProgressionResult {
    ProgressionResult {
        user_id: progression.user_id.clone(),
        outcome,
        updated_metric,
        newly_awarded_badges,
        xp: progression.xp,
        points: progression.points,
        new_level: after.level,
        progress_in_level: after.progress,
        leveled_up: after.level > before.level,
        ranked_up: after.position > before.position,
        new_rank: after.rank,
        version,
        progression,
    }
}

fn stage(user_id: &str, stage: Stage) {
    debug!(user_id, ?stage, "progression stage");
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(ProgressionError::InvalidEvent("user id is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryProgressionStore;

    fn first_like_catalog() -> BadgeCatalog {
        BadgeCatalog::new(vec![BadgeDefinition {
            id: "FIRST_LIKE".into(),
            metric_key: MetricKey::LikedProjects,
            target: 1,
            xp_reward: 10,
            rune_reward: 0,
            icon: String::new(),
            description: String::new(),
        }])
        .unwrap()
    }

    #[test]
    fn ranked_up_compares_positions() {
        let ranks = rank::default_ranks();
        let after = UserProgression { xp: 520, ..UserProgression::new("u1") };

        let result = build_result(
            Outcome::Committed,
            &Standing::at(450, &ranks),
            Standing::at(after.xp, &ranks),
            after,
            2,
            vec![],
            vec![],
        );
        assert!(result.ranked_up);
        assert!(result.leveled_up);
        assert_eq!(result.new_level, 6);
        assert_eq!(result.new_rank.unwrap().current.id, "adept");
    }

    #[test]
    fn no_ranks_means_no_rank_up() {
        let after = UserProgression { xp: 5000, ..UserProgression::new("u1") };
        let result = build_result(
            Outcome::Committed,
            &Standing::at(0, &[]),
            Standing::at(after.xp, &[]),
            after,
            1,
            vec![],
            vec![],
        );
        assert!(!result.ranked_up);
        assert!(result.new_rank.is_none());
    }

    #[test]
    fn standing_tracks_level_and_rank_position() {
        let ranks = rank::default_ranks();
        let standing = Standing::at(2050, &ranks);
        assert_eq!(standing.level, 21);
        assert_eq!(standing.progress, 50);
        assert_eq!(standing.position, Some(2));
        assert_eq!(standing.rank.unwrap().current.id, "master");
        assert!(Standing::at(2050, &[]).position.is_none());
    }

    #[tokio::test]
    async fn reconcile_reports_only_new_awards() {
        let store = Arc::new(MemoryProgressionStore::new());
        let mut seeded = UserProgression::new("u1");
        seeded.record_set_event(MetricKey::LikedProjects, "p1").unwrap();
        store.seed(seeded);
        let engine = ProgressionEngine::new(store.clone(), first_like_catalog());

        let first = engine.reconcile("u1").await.unwrap();
        assert_eq!(first.newly_awarded_badges.len(), 1);
        assert_eq!(first.progression.badges, first.newly_awarded_badges);

        let second = engine.reconcile("u1").await.unwrap();
        assert!(second.newly_awarded_badges.is_empty());
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected_before_spawning() {
        let engine = ProgressionEngine::new(MemoryProgressionStore::new(), first_like_catalog());
        let err = engine.apply_event(ProgressionEvent::like("", "p1")).await.unwrap_err();
        assert!(matches!(err, ProgressionError::InvalidEvent(_)));
        assert!(matches!(engine.reconcile(" ").await, Err(ProgressionError::InvalidEvent(_))));
    }

    #[tokio::test]
    async fn first_like_scenario() {
        let engine = ProgressionEngine::new(MemoryProgressionStore::new(), first_like_catalog());

        let result = engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();

        assert_eq!(result.outcome, Outcome::Committed);
        assert_eq!(result.xp, 10);
        assert_eq!(result.new_level, 1);
        assert!(!result.leveled_up);
        assert_eq!(result.newly_awarded_badges.len(), 1);
        assert_eq!(result.newly_awarded_badges[0].badge_id, "FIRST_LIKE");
        assert_eq!(
            result.updated_metric,
            vec![MetricValue { key: MetricKey::LikedProjects, value: 1 }]
        );

        let snapshot = engine.snapshot("u1").await.unwrap();
        assert!(snapshot.has_interaction(MetricKey::LikedProjects, "p1"));
        assert_eq!(snapshot.badges.len(), 1);
        assert_eq!(snapshot.xp, 10);
    }

    #[tokio::test]
    async fn unchanged_reconcile_does_not_write() {
        let store = Arc::new(MemoryProgressionStore::new());
        let engine = ProgressionEngine::new(store.clone(), first_like_catalog());

        engine.apply_event(ProgressionEvent::like("u1", "p1")).await.unwrap();
        let result = engine.reconcile("u1").await.unwrap();

        assert!(result.newly_awarded_badges.is_empty());
        assert_eq!(result.version, 1);
        assert_eq!(store.commit_count(), 1);
    }
}
