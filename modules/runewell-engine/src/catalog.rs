//! Immutable badge catalog, indexed by metric key.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use runewell_common::file_config::load_badge_catalog;
use runewell_common::{BadgeDefinition, CatalogError, MetricKey};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BadgeCatalog {
    /// Insertion order, for listing.
    badges: Vec<BadgeDefinition>,
    /// Per metric, ascending by target then id.
    by_metric: HashMap<MetricKey, Vec<BadgeDefinition>>,
}

impl BadgeCatalog {
    /// Validate and index a list of definitions. Ids must be unique and
    /// targets positive.
    pub fn new(badges: Vec<BadgeDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for badge in &badges {
            if !seen.insert(badge.id.as_str()) {
                return Err(CatalogError::DuplicateBadgeId(badge.id.clone()));
            }
            if badge.target == 0 {
                return Err(CatalogError::ZeroTarget(badge.id.clone()));
            }
        }

        let mut by_metric: HashMap<MetricKey, Vec<BadgeDefinition>> = HashMap::new();
        for badge in &badges {
            by_metric
                .entry(badge.metric_key)
                .or_default()
                .push(badge.clone());
        }
        for defs in by_metric.values_mut() {
            defs.sort_by(|a, b| a.target.cmp(&b.target).then_with(|| a.id.cmp(&b.id)));
        }

        let catalog = Self { badges, by_metric };
        for key in catalog.producer_gaps() {
            warn!(metric = %key, "Badge catalog references a metric with no event producer");
        }
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        Self::new(load_badge_catalog(path)?)
    }

    /// Definitions tracking `key`, ascending by target.
    pub fn definitions_for_metric(&self, key: MetricKey) -> &[BadgeDefinition] {
        self.by_metric.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all(&self) -> &[BadgeDefinition] {
        &self.badges
    }

    pub fn get(&self, badge_id: &str) -> Option<&BadgeDefinition> {
        self.badges.iter().find(|b| b.id == badge_id)
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }

    /// Metric keys referenced by a badge that no action type ever increases.
    /// Such badges can never be earned through events.
    pub fn producer_gaps(&self) -> Vec<MetricKey> {
        let mut gaps: Vec<MetricKey> = self
            .by_metric
            .keys()
            .copied()
            .filter(|key| key.producers().is_empty())
            .collect();
        gaps.sort();
        gaps
    }

    /// The catalog compiled into the binary.
    pub fn builtin() -> Self {
        Self::new(builtin_badges()).expect("built-in badge catalog should always be valid")
    }
}

fn badge(
    id: &str,
    metric_key: MetricKey,
    target: u64,
    xp_reward: u64,
    rune_reward: u64,
    icon: &str,
    description: &str,
) -> BadgeDefinition {
    BadgeDefinition {
        id: id.to_string(),
        metric_key,
        target,
        xp_reward,
        rune_reward,
        icon: icon.to_string(),
        description: description.to_string(),
    }
}

fn builtin_badges() -> Vec<BadgeDefinition> {
    vec![
        badge("FIRST_LIKE", MetricKey::LikedProjects, 1, 10, 5, "heart", "Like your first project"),
        badge("ADMIRER", MetricKey::LikedProjects, 10, 50, 20, "hearts", "Like 10 different projects"),
        badge("PATRON", MetricKey::LikedProjects, 50, 150, 75, "crown", "Like 50 different projects"),
        badge("FIRST_COMMENT", MetricKey::CommentCount, 1, 10, 5, "speech", "Post your first comment"),
        badge("CONVERSATIONALIST", MetricKey::CommentCount, 25, 75, 30, "speech-double", "Post 25 comments"),
        badge("CRITIC", MetricKey::CommentedProjects, 10, 100, 40, "quill", "Comment on 10 different projects"),
        badge("NOTICED", MetricKey::ViewCount, 100, 25, 10, "eye", "Reach 100 project views"),
        badge("SPOTLIGHT", MetricKey::ViewCount, 1000, 200, 100, "spotlight", "Reach 1,000 project views"),
    ]
}
