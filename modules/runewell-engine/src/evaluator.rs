//! Decides which badges a metric value newly qualifies for. Never writes.

use std::collections::HashSet;

use runewell_common::{BadgeDefinition, MetricKey, UserProgression};

use crate::catalog::BadgeCatalog;

/// Badges tracking `metric` that are not in `owned` and whose target
/// `value` has reached, ascending by target. A single call may return
/// several badges when the value jumps past more than one threshold.
pub fn evaluate<'c>(
    catalog: &'c BadgeCatalog,
    metric: MetricKey,
    value: u64,
    owned: &HashSet<&str>,
) -> Vec<&'c BadgeDefinition> {
    catalog
        .definitions_for_metric(metric)
        .iter()
        .filter(|def| !owned.contains(def.id.as_str()))
        .take_while(|def| value >= def.target)
        .collect()
}

/// Evaluate several metrics against the aggregate's own values and badges.
/// Results are ordered by target, then id, across all metrics.
pub fn evaluate_metrics<'c>(
    catalog: &'c BadgeCatalog,
    progression: &UserProgression,
    metrics: &[MetricKey],
) -> Vec<&'c BadgeDefinition> {
    let owned = progression.owned_badge_ids();
    let mut qualifying: Vec<&BadgeDefinition> = metrics
        .iter()
        .flat_map(|key| evaluate(catalog, *key, progression.metric_value(*key), &owned))
        .collect();
    qualifying.sort_by(|a, b| a.target.cmp(&b.target).then_with(|| a.id.cmp(&b.id)));
    qualifying.dedup_by(|a, b| a.id == b.id);
    qualifying
}

/// Every badge the aggregate qualifies for but does not own.
pub fn evaluate_all<'c>(catalog: &'c BadgeCatalog, progression: &UserProgression) -> Vec<&'c BadgeDefinition> {
    evaluate_metrics(catalog, progression, &MetricKey::ALL)
}
