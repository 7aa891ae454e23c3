//! Versioned progression aggregates backed by Postgres.
//!
//! Every write is a single-row compare-and-swap on `version`. A writer that
//! read a stale version gets `StoreError::Conflict` and nothing is written.

use runewell_common::{RankDefinition, StoreError, UserProgression};
use sqlx::PgPool;
use tracing::debug;

use crate::types::{to_db, StoredProgression, StoredRank, Versioned};

type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// PgProgressionStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgProgressionStore {
    pool: PgPool,
}

impl PgProgressionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    /// Load a user's aggregate. Users never committed come back empty at version 0.
    pub async fn load(&self, user_id: &str) -> Result<Versioned<UserProgression>> {
        let row = sqlx::query_as::<_, StoredProgression>(
            r#"
            SELECT user_id, version, xp, points, metrics, interaction_sets, badges, updated_at
            FROM user_progressions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_progression(),
            None => Ok(Versioned::new(0, UserProgression::new(user_id))),
        }
    }

    /// Write the whole aggregate if the stored version still equals
    /// `expected_version`. Returns the new version.
    pub async fn commit(&self, progression: &UserProgression, expected_version: u64) -> Result<u64> {
        let next_version = expected_version + 1;
        let metrics = serde_json::to_value(&progression.metrics)?;
        let interaction_sets = serde_json::to_value(&progression.interaction_sets)?;
        let badges = serde_json::to_value(&progression.badges)?;

        let rows_affected = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO user_progressions
                    (user_id, version, xp, points, metrics, interaction_sets, badges, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, now())
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(&progression.user_id)
            .bind(to_db(next_version))
            .bind(to_db(progression.xp))
            .bind(to_db(progression.points))
            .bind(&metrics)
            .bind(&interaction_sets)
            .bind(&badges)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE user_progressions
                SET version = $2, xp = $3, points = $4, metrics = $5,
                    interaction_sets = $6, badges = $7, updated_at = now()
                WHERE user_id = $1 AND version = $8
                "#,
            )
            .bind(&progression.user_id)
            .bind(to_db(next_version))
            .bind(to_db(progression.xp))
            .bind(to_db(progression.points))
            .bind(&metrics)
            .bind(&interaction_sets)
            .bind(&badges)
            .bind(to_db(expected_version))
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            let found = self.current_version(&progression.user_id).await?;
            debug!(
                user_id = progression.user_id.as_str(),
                expected = expected_version,
                found,
                "Progression version conflict"
            );
            return Err(StoreError::Conflict {
                user_id: progression.user_id.clone(),
                expected: expected_version,
                found,
            });
        }

        Ok(next_version)
    }

    /// The stored version for a user, or 0 if absent.
    pub async fn current_version(&self, user_id: &str) -> Result<u64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT version FROM user_progressions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| crate::types::from_db(r.0)).unwrap_or(0))
    }

    // -- Rank catalog -------------------------------------------------------

    /// All ranks in catalog insertion order.
    pub async fn list_ranks(&self) -> Result<Vec<RankDefinition>> {
        let rows = sqlx::query_as::<_, StoredRank>(
            r#"
            SELECT position, id, name, subtitle, min_xp, description, image
            FROM ranks
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RankDefinition::from).collect())
    }

    /// Insert a rank, or update it in place keeping its original position.
    pub async fn upsert_rank(&self, rank: &RankDefinition) -> Result<()> {
        upsert_rank_query(rank).execute(&self.pool).await?;
        Ok(())
    }

    /// Make the table match `ranks`: rows whose id is not listed are
    /// deleted, the rest are upserted in order. One transaction.
    pub async fn sync_ranks(&self, ranks: &[RankDefinition]) -> Result<u64> {
        let ids: Vec<String> = ranks.iter().map(|r| r.id.clone()).collect();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM ranks WHERE NOT (id = ANY($1))")
            .bind(ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for rank in ranks {
            upsert_rank_query(rank).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(removed)
    }
}

fn upsert_rank_query(
    rank: &RankDefinition,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO ranks (id, name, subtitle, min_xp, description, image)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, subtitle = EXCLUDED.subtitle, min_xp = EXCLUDED.min_xp,
            description = EXCLUDED.description, image = EXCLUDED.image
        "#,
    )
    .bind(&rank.id)
    .bind(&rank.name)
    .bind(&rank.subtitle)
    .bind(to_db(rank.min_xp))
    .bind(&rank.description)
    .bind(&rank.image)
}

// ---------------------------------------------------------------------------
// Test utilities
// ---------------------------------------------------------------------------

#[cfg(feature = "test-utils")]
impl PgProgressionStore {
    /// Remove all progression rows and ranks (for tests).
    pub async fn truncate_all(&self) -> Result<()> {
        sqlx::query("TRUNCATE user_progressions, ranks RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
