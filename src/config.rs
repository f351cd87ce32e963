use serde::{Deserialize, Serialize};

use crate::types::Subject;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Maximum per-item theta step in logits.
    pub max_step: f64,
    /// Lower bound on sigma to avoid false convergence.
    pub sigma_floor: f64,
    /// Stop once sigma falls to this level.
    pub convergence_threshold: f64,
    /// Stop once this many items have been administered for a skill.
    pub max_items_per_skill: u32,
    /// Early-exit ability level.
    pub mastery_theta: f64,
    /// Consecutive correct answers required for the mastery exit.
    pub mastery_streak: u32,
    /// Rolling window used for recent accuracy.
    pub accuracy_window: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            max_step: 0.75,
            sigma_floor: 0.2,
            convergence_threshold: 0.35,
            max_items_per_skill: 12,
            mastery_theta: 1.5,
            mastery_streak: 3,
            accuracy_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaknessConfig {
    /// Skills with fewer attempts are not scored at all.
    pub min_attempts: u32,
    /// Mastery bar the recent accuracy is measured against.
    pub target_accuracy: f64,
}

impl Default for WeaknessConfig {
    fn default() -> Self {
        Self {
            min_attempts: 3,
            target_accuracy: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub verbal_threshold: f64,
    pub math_threshold: f64,
    pub max_section_score: u32,
    pub total_cap: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            verbal_threshold: 0.70,
            math_threshold: 0.75,
            max_section_score: 800,
            total_cap: 1600,
        }
    }
}

impl RoutingConfig {
    pub fn threshold_for(&self, subject: Subject) -> f64 {
        match subject {
            Subject::Verbal => self.verbal_threshold,
            Subject::Math => self.math_threshold,
        }
    }
}

/// Easy/medium/hard share of a candidate draw. Weights are renormalized
/// over the difficulty buckets actually present in the pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DifficultyMix {
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
}

impl Default for DifficultyMix {
    fn default() -> Self {
        Self {
            easy: 0.3,
            medium: 0.5,
            hard: 0.2,
        }
    }
}

impl DifficultyMix {
    pub fn easy_leaning() -> Self {
        Self {
            easy: 0.5,
            medium: 0.4,
            hard: 0.1,
        }
    }

    pub fn hard_leaning() -> Self {
        Self {
            easy: 0.1,
            medium: 0.4,
            hard: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Predicted-probability target for information-maximizing picks.
    pub irt_target_probability: f64,
    pub baseline_mix: DifficultyMix,
    pub easy_path_mix: DifficultyMix,
    pub hard_path_mix: DifficultyMix,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            irt_target_probability: 0.55,
            baseline_mix: DifficultyMix::default(),
            easy_path_mix: DifficultyMix::easy_leaning(),
            hard_path_mix: DifficultyMix::hard_leaning(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Questions per module in a module-routed session.
    pub questions_per_module: u32,
    pub module_count: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            questions_per_module: 27,
            module_count: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub estimator: EstimatorConfig,
    pub weakness: WeaknessConfig,
    pub routing: RoutingConfig,
    pub selection: SelectionConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ENGINE_MAX_ITEMS_PER_SKILL") {
            if let Ok(parsed) = val.parse() {
                config.estimator.max_items_per_skill = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_CONVERGENCE_THRESHOLD") {
            if let Ok(parsed) = val.parse() {
                config.estimator.convergence_threshold = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_TARGET_ACCURACY") {
            if let Ok(parsed) = val.parse() {
                config.weakness.target_accuracy = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_VERBAL_THRESHOLD") {
            if let Ok(parsed) = val.parse() {
                config.routing.verbal_threshold = parsed;
            }
        }
        if let Ok(val) = std::env::var("ENGINE_MATH_THRESHOLD") {
            if let Ok(parsed) = val.parse() {
                config.routing.math_threshold = parsed;
            }
        }

        config
    }
}
