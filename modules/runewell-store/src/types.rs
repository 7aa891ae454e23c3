//! Row types for the progression tables.

use chrono::{DateTime, Utc};
use runewell_common::{RankDefinition, StoreError, UserProgression};

/// A `user_progressions` row as stored in Postgres.
#[derive(Debug, Clone)]
pub struct StoredProgression {
    pub user_id: String,
    pub version: i64,
    pub xp: i64,
    pub points: i64,
    pub metrics: serde_json::Value,
    pub interaction_sets: serde_json::Value,
    pub badges: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// An aggregate paired with the version it was read at. Version 0 means the
/// user has never been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, value: T) -> Self {
        Self { version, value }
    }
}

impl StoredProgression {
    pub fn into_progression(self) -> Result<Versioned<UserProgression>, StoreError> {
        let progression = UserProgression {
            user_id: self.user_id,
            xp: from_db(self.xp),
            points: from_db(self.points),
            metrics: serde_json::from_value(self.metrics)?,
            interaction_sets: serde_json::from_value(self.interaction_sets)?,
            badges: serde_json::from_value(self.badges)?,
        };
        Ok(Versioned::new(from_db(self.version), progression))
    }
}

/// A `ranks` row. `position` is the catalog insertion order.
#[derive(Debug, Clone)]
pub struct StoredRank {
    pub position: i64,
    pub id: String,
    pub name: String,
    pub subtitle: String,
    pub min_xp: i64,
    pub description: String,
    pub image: String,
}

impl From<StoredRank> for RankDefinition {
    fn from(row: StoredRank) -> Self {
        RankDefinition {
            id: row.id,
            name: row.name,
            subtitle: row.subtitle,
            min_xp: from_db(row.min_xp),
            description: row.description,
            image: row.image,
        }
    }
}

/// BIGINT columns are signed; CHECK constraints keep them non-negative.
pub(crate) fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// sqlx::FromRow
// ---------------------------------------------------------------------------

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredProgression {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(StoredProgression {
            user_id: row.try_get("user_id")?,
            version: row.try_get("version")?,
            xp: row.try_get("xp")?,
            points: row.try_get("points")?,
            metrics: row.try_get("metrics")?,
            interaction_sets: row.try_get("interaction_sets")?,
            badges: row.try_get("badges")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRank {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(StoredRank {
            position: row.try_get("position")?,
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            subtitle: row.try_get("subtitle")?,
            min_xp: row.try_get("min_xp")?,
            description: row.try_get("description")?,
            image: row.try_get("image")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn negative_db_values_read_as_zero() {
        assert_eq!(from_db(-5), 0);
        assert_eq!(to_db(u64::MAX), i64::MAX);
    }

    #[test]
    fn row_decodes_json_columns() {
        let row = StoredProgression {
            user_id: "u1".into(),
            version: 3,
            xp: 120,
            points: 7,
            metrics: json!({"viewCount": 4}),
            interaction_sets: json!({"likedProjects": ["p1", "p2"]}),
            badges: json!([{"badgeId": "FIRST_LIKE", "awardedAt": "2026-01-01T00:00:00Z"}]),
            updated_at: Utc::now(),
        };

        let versioned = row.into_progression().unwrap();
        assert_eq!(versioned.version, 3);
        let p = versioned.value;
        assert_eq!(p.xp, 120);
        assert_eq!(p.metric_value(runewell_common::MetricKey::ViewCount), 4);
        assert_eq!(p.metric_value(runewell_common::MetricKey::LikedProjects), 2);
        assert!(p.has_badge("FIRST_LIKE"));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let row = StoredProgression {
            user_id: "u1".into(),
            version: 1,
            xp: 0,
            points: 0,
            metrics: json!({"shareCount": 1}),
            interaction_sets: json!({}),
            badges: json!([]),
            updated_at: Utc::now(),
        };
        assert!(matches!(row.into_progression(), Err(StoreError::Serialization(_))));
    }
}
