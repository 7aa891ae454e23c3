//! The per-user progression aggregate and its metric operations.
//!
//! Counters and interaction sets only change through the methods here. An
//! interaction set's cardinality is the metric value; there is no parallel
//! counter to drift out of sync.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricError;
use crate::types::{AwardedBadge, BadgeDefinition, MetricKey, MetricKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgression {
    pub user_id: String,
    pub xp: u64,
    /// Rune balance.
    pub points: u64,
    #[serde(default)]
    pub metrics: BTreeMap<MetricKey, u64>,
    #[serde(default)]
    pub interaction_sets: BTreeMap<MetricKey, BTreeSet<String>>,
    /// Append-only, unique by badge id.
    #[serde(default)]
    pub badges: Vec<AwardedBadge>,
}

impl UserProgression {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            xp: 0,
            points: 0,
            metrics: BTreeMap::new(),
            interaction_sets: BTreeMap::new(),
            badges: Vec::new(),
        }
    }

    // -- Metric store -------------------------------------------------------

    /// Increment a counter metric by exactly one. Returns the new value.
    pub fn record_counter_event(&mut self, key: MetricKey) -> Result<u64, MetricError> {
        if key.kind() != MetricKind::Counter {
            return Err(MetricError::NotACounter(key));
        }
        let counter = self.metrics.entry(key).or_insert(0);
        *counter = counter.saturating_add(1);
        Ok(*counter)
    }

    /// Insert a target into a set metric. Returns whether the set changed;
    /// `false` means the interaction was already counted.
    pub fn record_set_event(&mut self, key: MetricKey, target_id: &str) -> Result<bool, MetricError> {
        if key.kind() != MetricKind::Set {
            return Err(MetricError::NotASet(key));
        }
        Ok(self
            .interaction_sets
            .entry(key)
            .or_default()
            .insert(target_id.to_string()))
    }

    /// Remove a target from a set metric. Badges are never revoked.
    pub fn remove_set_event(&mut self, key: MetricKey, target_id: &str) -> Result<bool, MetricError> {
        if key.kind() != MetricKind::Set {
            return Err(MetricError::NotASet(key));
        }
        let Some(set) = self.interaction_sets.get_mut(&key) else {
            return Ok(false);
        };
        let removed = set.remove(target_id);
        if set.is_empty() {
            self.interaction_sets.remove(&key);
        }
        Ok(removed)
    }

    /// Current value of a metric: the counter, or the set's cardinality.
    pub fn metric_value(&self, key: MetricKey) -> u64 {
        match key.kind() {
            MetricKind::Counter => self.metrics.get(&key).copied().unwrap_or(0),
            MetricKind::Set => self
                .interaction_sets
                .get(&key)
                .map(|set| set.len() as u64)
                .unwrap_or(0),
        }
    }

    pub fn has_interaction(&self, key: MetricKey, target_id: &str) -> bool {
        self.interaction_sets
            .get(&key)
            .is_some_and(|set| set.contains(target_id))
    }

    // -- Badges and rewards -------------------------------------------------

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b.badge_id == badge_id)
    }

    pub fn owned_badge_ids(&self) -> HashSet<&str> {
        self.badges.iter().map(|b| b.badge_id.as_str()).collect()
    }

    /// Append the badge and credit its rewards as one step. Returns `false`
    /// without touching anything if the badge is already owned.
    pub fn award_badge(&mut self, badge: &BadgeDefinition, awarded_at: DateTime<Utc>) -> bool {
        if self.has_badge(&badge.id) {
            return false;
        }
        self.badges.push(AwardedBadge {
            badge_id: badge.id.clone(),
            awarded_at,
        });
        self.xp = self.xp.saturating_add(badge.xp_reward);
        self.points = self.points.saturating_add(badge.rune_reward);
        true
    }

    /// Apply a signed external adjustment. Balances clamp at zero.
    pub fn apply_grant(&mut self, xp_delta: i64, rune_delta: i64) {
        self.xp = apply_delta(self.xp, xp_delta);
        self.points = apply_delta(self.points, rune_delta);
    }
}

fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta.unsigned_abs())
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}
