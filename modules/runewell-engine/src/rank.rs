//! Rank resolution over an admin-managed threshold catalog.
//!
//! The catalog is sorted ascending by `min_xp` with a stable sort, so entries
//! sharing a `min_xp` keep insertion order and the later one wins. Duplicate
//! thresholds are tolerated, not corrected.

use runewell_common::RankDefinition;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankStanding {
    pub current: RankDefinition,
    pub next: Option<RankDefinition>,
    /// `xp / next.min_xp` as a percentage clamped to [0, 100]. Display only.
    pub percent_to_next: f64,
}

/// Stable ascending sort by `min_xp`.
pub fn sorted(ranks: &[RankDefinition]) -> Vec<&RankDefinition> {
    let mut sorted: Vec<&RankDefinition> = ranks.iter().collect();
    sorted.sort_by_key(|r| r.min_xp);
    sorted
}

/// Index of the current rank in `sorted(ranks)`.
pub fn position(xp: u64, ranks: &[RankDefinition]) -> Option<usize> {
    position_in(xp, &sorted(ranks))
}

fn position_in(xp: u64, sorted: &[&RankDefinition]) -> Option<usize> {
    if sorted.is_empty() {
        return None;
    }
    // No rank reached yet: fall back to the lowest entry.
    Some(sorted.iter().rposition(|r| r.min_xp <= xp).unwrap_or(0))
}

pub fn current_rank(xp: u64, ranks: &[RankDefinition]) -> Option<&RankDefinition> {
    let sorted = sorted(ranks);
    position_in(xp, &sorted).map(|i| sorted[i])
}

pub fn next_rank(xp: u64, ranks: &[RankDefinition]) -> Option<&RankDefinition> {
    let sorted = sorted(ranks);
    position_in(xp, &sorted).and_then(|i| sorted.get(i + 1).copied())
}

pub fn percent_to_next(xp: u64, next: Option<&RankDefinition>) -> f64 {
    match next {
        Some(next) if next.min_xp > 0 => (xp as f64 / next.min_xp as f64 * 100.0).clamp(0.0, 100.0),
        _ => 100.0,
    }
}

/// Current rank, next rank and display percentage in one pass.
pub fn resolve(xp: u64, ranks: &[RankDefinition]) -> Option<RankStanding> {
    let sorted = sorted(ranks);
    let i = position_in(xp, &sorted)?;
    let next = sorted.get(i + 1).copied();
    Some(RankStanding {
        current: sorted[i].clone(),
        next: next.cloned(),
        percent_to_next: percent_to_next(xp, next),
    })
}

/// Catalog used when no rank catalog has been configured.
pub fn default_ranks() -> Vec<RankDefinition> {
    vec![
        RankDefinition {
            subtitle: "Just passing through".into(),
            description: "Every portfolio starts somewhere.".into(),
            image: "ranks/wanderer.png".into(),
            ..RankDefinition::new("wanderer", "Wanderer", 0)
        },
        RankDefinition {
            subtitle: "Finding a voice".into(),
            description: "A regular presence in the community.".into(),
            image: "ranks/adept.png".into(),
            ..RankDefinition::new("adept", "Adept", 500)
        },
        RankDefinition {
            subtitle: "Known by their work".into(),
            description: "Trusted, followed and frequently featured.".into(),
            image: "ranks/master.png".into(),
            ..RankDefinition::new("master", "Master", 2000)
        },
        RankDefinition {
            subtitle: "Carved into the runes".into(),
            description: "The community's most celebrated creators.".into(),
            image: "ranks/legend.png".into(),
            ..RankDefinition::new("legend", "Legend", 5000)
        },
    ]
}
