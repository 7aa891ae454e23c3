//! Gamification progression engine.
//!
//! Turns activity events into metric updates, badge awards, XP, levels and
//! ranks. All writes go through `ProgressionEngine`, which serializes per
//! user and commits each event as one versioned write.
//!
//! Persistence sits behind `ProgressionStore`: Postgres in production, the
//! in-memory store for tests and local runs.

pub mod catalog;
pub mod engine;
pub mod evaluator;
pub mod level;
pub mod locks;
pub mod persist;
pub mod rank;
pub mod traits;

pub use catalog::BadgeCatalog;
pub use engine::{
    EngineConfig, MetricValue, Outcome, ProgressionEngine, ProgressionProfile, ProgressionResult,
    Stage,
};
pub use level::{level, progress_in_level, LevelProgress, XP_PER_LEVEL};
pub use persist::MemoryProgressionStore;
pub use rank::RankStanding;
pub use traits::ProgressionStore;
