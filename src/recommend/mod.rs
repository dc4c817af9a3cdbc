//! Intent-based tool recommendation

mod engine;
mod scores;

pub use engine::{Recommendation, RecommendationEngine};
pub use scores::{FAILURE_PENALTY, IntentScoreTable, SUCCESS_REWARD};
