use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::CatalogError;
use crate::types::{BadgeDefinition, RankDefinition};

/// TOML-backed badge catalog: a list of `[[badges]]` tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BadgeCatalogFile {
    pub badges: Vec<BadgeDefinition>,
}

/// TOML-backed rank catalog: a list of `[[ranks]]` tables, in insertion order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankCatalogFile {
    pub ranks: Vec<RankDefinition>,
}

pub fn load_badge_catalog(path: &Path) -> Result<Vec<BadgeDefinition>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read badge catalog: {}", path.display()))?;
    let file: BadgeCatalogFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse badge catalog: {}", path.display()))?;
    Ok(file.badges)
}

pub fn load_rank_catalog(path: &Path) -> Result<Vec<RankDefinition>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rank catalog: {}", path.display()))?;
    let file: RankCatalogFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse rank catalog: {}", path.display()))?;
    validate_ranks(&file.ranks)
        .with_context(|| format!("Invalid rank catalog: {}", path.display()))?;
    Ok(file.ranks)
}

/// Rank ids are the storage key and must be unique.
pub fn validate_ranks(ranks: &[RankDefinition]) -> std::result::Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for rank in ranks {
        if !seen.insert(rank.id.as_str()) {
            return Err(CatalogError::DuplicateRankId(rank.id.clone()));
        }
    }
    Ok(())
}
