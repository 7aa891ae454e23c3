use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProgressionError;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// How a metric is stored on the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Repeatable activity, plain counter.
    Counter,
    /// Deduplicated by target id; value is the set cardinality.
    Set,
}

/// A tracked activity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKey {
    /// Views received on the user's projects.
    ViewCount,
    /// Comments posted, including repeat comments on one project.
    CommentCount,
    /// Distinct projects the user has liked.
    LikedProjects,
    /// Distinct projects the user has commented on.
    CommentedProjects,
}

impl MetricKey {
    pub const ALL: [MetricKey; 4] = [
        MetricKey::ViewCount,
        MetricKey::CommentCount,
        MetricKey::LikedProjects,
        MetricKey::CommentedProjects,
    ];

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricKey::ViewCount | MetricKey::CommentCount => MetricKind::Counter,
            MetricKey::LikedProjects | MetricKey::CommentedProjects => MetricKind::Set,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::ViewCount => "viewCount",
            MetricKey::CommentCount => "commentCount",
            MetricKey::LikedProjects => "likedProjects",
            MetricKey::CommentedProjects => "commentedProjects",
        }
    }

    /// Actions whose effects increase this metric.
    pub fn producers(&self) -> Vec<ActionType> {
        ActionType::ALL
            .into_iter()
            .filter(|action| action.effects().increments().any(|key| key == *self))
            .collect()
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ProgressionError::UnknownMetricKey(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Actions and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    View,
    Like,
    Comment,
    Unlike,
    Uncomment,
}

/// What an action does to the aggregate's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEffects {
    /// Insert into or removal from a set-backed metric.
    pub set: Option<(MetricKey, SetOp)>,
    /// Counter incremented unconditionally.
    pub counter: Option<MetricKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Insert,
    Remove,
}

impl ActionEffects {
    /// Metric keys this action can make go up.
    pub fn increments(&self) -> impl Iterator<Item = MetricKey> {
        let set = match self.set {
            Some((key, SetOp::Insert)) => Some(key),
            _ => None,
        };
        set.into_iter().chain(self.counter)
    }
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::View,
        ActionType::Like,
        ActionType::Comment,
        ActionType::Unlike,
        ActionType::Uncomment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::View => "view",
            ActionType::Like => "like",
            ActionType::Comment => "comment",
            ActionType::Unlike => "unlike",
            ActionType::Uncomment => "uncomment",
        }
    }

    /// The action → metric mapping table.
    pub fn effects(&self) -> ActionEffects {
        match self {
            ActionType::View => ActionEffects {
                set: None,
                counter: Some(MetricKey::ViewCount),
            },
            ActionType::Like => ActionEffects {
                set: Some((MetricKey::LikedProjects, SetOp::Insert)),
                counter: None,
            },
            ActionType::Comment => ActionEffects {
                set: Some((MetricKey::CommentedProjects, SetOp::Insert)),
                counter: Some(MetricKey::CommentCount),
            },
            ActionType::Unlike => ActionEffects {
                set: Some((MetricKey::LikedProjects, SetOp::Remove)),
                counter: None,
            },
            ActionType::Uncomment => ActionEffects {
                set: Some((MetricKey::CommentedProjects, SetOp::Remove)),
                counter: None,
            },
        }
    }

    pub fn requires_target(&self) -> bool {
        self.effects().set.is_some()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ProgressionError::UnknownMetricKey(s.to_string()))
    }
}

/// A unit of activity submitted to the engine. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionEvent {
    pub user_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub target_id: Option<String>,
}

impl ProgressionEvent {
    pub fn new(user_id: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            user_id: user_id.into(),
            action_type,
            target_id: None,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn view(user_id: impl Into<String>) -> Self {
        Self::new(user_id, ActionType::View)
    }

    pub fn like(user_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::new(user_id, ActionType::Like).with_target(target_id)
    }

    pub fn unlike(user_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::new(user_id, ActionType::Unlike).with_target(target_id)
    }

    pub fn comment(user_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::new(user_id, ActionType::Comment).with_target(target_id)
    }

    pub fn uncomment(user_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::new(user_id, ActionType::Uncomment).with_target(target_id)
    }

    /// Build an event from raw strings as received at an RPC boundary.
    pub fn parse(
        user_id: &str,
        action_type: &str,
        target_id: Option<&str>,
    ) -> Result<Self, ProgressionError> {
        let event = Self {
            user_id: user_id.to_string(),
            action_type: action_type.parse()?,
            target_id: target_id.map(str::to_string),
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), ProgressionError> {
        if self.user_id.trim().is_empty() {
            return Err(ProgressionError::InvalidEvent("user id is empty".into()));
        }
        if self.action_type.requires_target() {
            match self.target_id.as_deref() {
                Some(t) if !t.trim().is_empty() => {}
                _ => {
                    return Err(ProgressionError::InvalidEvent(format!(
                        "{} requires a target id",
                        self.action_type
                    )))
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Catalog definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDefinition {
    pub id: String,
    #[serde(alias = "metric_key")]
    pub metric_key: MetricKey,
    pub target: u64,
    #[serde(default, alias = "xp_reward")]
    pub xp_reward: u64,
    #[serde(default, alias = "rune_reward")]
    pub rune_reward: u64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(alias = "min_xp")]
    pub min_xp: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

impl RankDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, min_xp: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subtitle: String::new(),
            min_xp,
            description: String::new(),
            image: String::new(),
        }
    }
}

/// A badge entry on a user's progression. `awarded_at` never changes once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardedBadge {
    pub badge_id: String,
    pub awarded_at: DateTime<Utc>,
}
