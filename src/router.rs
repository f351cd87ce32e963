//! Two-stage module routing and score scaling.
//!
//! The band table compresses low-accuracy outcomes and spreads out the top
//! end; it is fixed behavior that downstream score-compatibility tests pin
//! exactly, so the bands themselves are not configurable.

use crate::config::RoutingConfig;
use crate::types::{DifficultyPath, ModuleResult};

pub struct ModuleRouter {
    config: RoutingConfig,
}

impl ModuleRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Continuation path after module 1. The threshold is inclusive: exactly
    /// meeting it routes hard.
    pub fn decide_path(&self, result: &ModuleResult, threshold: f64) -> DifficultyPath {
        if result.performance >= threshold {
            DifficultyPath::Hard
        } else {
            DifficultyPath::Easy
        }
    }

    /// Piecewise-linear mapping from accuracy to an 800-normalized score,
    /// rescaled to the section maximum.
    pub fn scale_score(&self, accuracy: f64, max_section_score: u32) -> u32 {
        let acc = accuracy.clamp(0.0, 1.0);
        let normalized = if acc >= 0.90 {
            750.0 + (acc - 0.90) / 0.10 * 50.0
        } else if acc >= 0.80 {
            700.0 + (acc - 0.80) / 0.10 * 40.0
        } else if acc >= 0.70 {
            650.0 + (acc - 0.70) / 0.10 * 40.0
        } else if acc >= 0.60 {
            600.0 + (acc - 0.60) / 0.10 * 40.0
        } else {
            400.0 + acc / 0.60 * 200.0
        };

        let max = max_section_score as f64;
        (normalized / 800.0 * max).clamp(0.0, max).round() as u32
    }

    pub fn combine_section_scores(&self, section_scores: &[u32], total_cap: u32) -> u32 {
        section_scores.iter().sum::<u32>().min(total_cap)
    }
}
