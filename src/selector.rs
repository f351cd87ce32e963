//! Next-question selection.
//!
//! Three modes: information-targeted (pick the candidate whose predicted
//! probability sits closest to the target), weakness-targeted (skill filter
//! plus a weighted difficulty draw) and random. Random and weakness draws
//! honor the difficulty mix in the context, so a routed module actually
//! leans easier or harder. Every selection is tagged with a reason;
//! fallback reasons are distinct so degraded picks can be audited.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{DifficultyMix, SelectionConfig};
use crate::estimator::ProficiencyEstimator;
use crate::types::{DifficultyLabel, Question, SelectionReason, SessionHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Irt,
    Weakness,
    Random,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    /// Target skill, required by `Irt` and `Weakness` modes.
    pub skill_id: Option<String>,
    /// Difficulty mix applied to random and weakness-mode draws.
    pub mix: Option<DifficultyMix>,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub question: Question,
    pub reason: SelectionReason,
}

pub struct QuestionSelector {
    config: SelectionConfig,
}

impl QuestionSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Picks the best next item from `pool`, never repeating an id already
    /// in `history`. Returns `None` only when the filtered pool is empty in
    /// every mode: the terminal no-more-questions signal.
    pub fn select_next(
        &self,
        pool: &[Question],
        history: &SessionHistory,
        mode: SelectionMode,
        ctx: &SelectionContext,
        estimator: &ProficiencyEstimator,
    ) -> Option<Selection> {
        let fresh: Vec<&Question> = pool.iter().filter(|q| !history.contains(&q.id)).collect();
        if fresh.is_empty() {
            return None;
        }

        match mode {
            SelectionMode::Random => {
                let mix = ctx.mix.unwrap_or(self.config.baseline_mix);
                Self::weighted_draw(&fresh, mix).map(|question| Selection {
                    question: question.clone(),
                    reason: SelectionReason::Random,
                })
            }
            SelectionMode::Irt => self.select_irt(&fresh, ctx, estimator),
            SelectionMode::Weakness => self.select_weakness(&fresh, ctx),
        }
    }

    fn select_irt(
        &self,
        fresh: &[&Question],
        ctx: &SelectionContext,
        estimator: &ProficiencyEstimator,
    ) -> Option<Selection> {
        let Some(skill_id) = ctx.skill_id.as_deref() else {
            tracing::warn!("irt selection without a target skill, falling back to random");
            return Self::uniform(fresh, SelectionReason::FallbackError);
        };

        let theta = estimator.theta(skill_id);
        let target = self.config.irt_target_probability;

        let mut best: Option<(&Question, f64)> = None;
        for question in fresh {
            let params = ProficiencyEstimator::item_parameters(question.difficulty_label);
            let p = ProficiencyEstimator::probability(theta, &params);
            if !p.is_finite() {
                tracing::warn!(skill_id, "non-finite predicted probability during selection");
                return Self::uniform(fresh, SelectionReason::FallbackError);
            }
            let distance = (p - target).abs();
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((*question, distance)),
            }
        }

        best.map(|(question, _)| Selection {
            question: question.clone(),
            reason: SelectionReason::Irt,
        })
    }

    fn select_weakness(&self, fresh: &[&Question], ctx: &SelectionContext) -> Option<Selection> {
        let Some(skill_id) = ctx.skill_id.as_deref() else {
            return Self::uniform(fresh, SelectionReason::FallbackRandom);
        };

        let skill_pool: Vec<&Question> = fresh
            .iter()
            .filter(|q| q.skill_id == skill_id)
            .copied()
            .collect();
        if skill_pool.is_empty() {
            // Nothing left for the weak skill; keep the session going with
            // the whole pool.
            return Self::uniform(fresh, SelectionReason::FallbackRandom);
        }

        let mix = ctx.mix.unwrap_or(self.config.baseline_mix);
        Self::weighted_draw(&skill_pool, mix).map(|question| Selection {
            question: question.clone(),
            reason: SelectionReason::Weakness,
        })
    }

    /// Draws a difficulty bucket by weight (renormalized over non-empty
    /// buckets), then uniformly within the bucket. `None` only for an empty
    /// pool.
    fn weighted_draw<'a>(pool: &[&'a Question], mix: DifficultyMix) -> Option<&'a Question> {
        let mut rng = rand::thread_rng();
        let buckets = [
            (DifficultyLabel::Easy, mix.easy),
            (DifficultyLabel::Medium, mix.medium),
            (DifficultyLabel::Hard, mix.hard),
        ];

        let present: Vec<(DifficultyLabel, f64)> = buckets
            .iter()
            .filter(|(label, weight)| {
                *weight > 0.0 && pool.iter().any(|q| q.difficulty_label == *label)
            })
            .copied()
            .collect();

        if present.is_empty() {
            return pool.choose(&mut rng).copied();
        }

        let total: f64 = present.iter().map(|(_, w)| w).sum();
        let mut roll = rng.gen_range(0.0..total);
        let mut chosen = present[present.len() - 1].0;
        for (label, weight) in &present {
            if roll < *weight {
                chosen = *label;
                break;
            }
            roll -= weight;
        }

        let bucket: Vec<&'a Question> = pool
            .iter()
            .filter(|q| q.difficulty_label == chosen)
            .copied()
            .collect();
        bucket
            .choose(&mut rng)
            .copied()
            .or_else(|| pool.choose(&mut rng).copied())
    }

    fn uniform(fresh: &[&Question], reason: SelectionReason) -> Option<Selection> {
        let mut rng = rand::thread_rng();
        fresh.choose(&mut rng).map(|q| Selection {
            question: (*q).clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorConfig;
    use crate::types::Subject;

    fn selector() -> QuestionSelector {
        QuestionSelector::new(SelectionConfig::default())
    }

    fn estimator() -> ProficiencyEstimator {
        ProficiencyEstimator::new(EstimatorConfig::default())
    }

    fn question(id: &str, skill: &str, label: DifficultyLabel) -> Question {
        Question {
            id: id.to_string(),
            skill_id: skill.to_string(),
            subject: Subject::Math,
            difficulty_label: label,
            correct_answer_key: "A".to_string(),
        }
    }

    fn skill_ctx(skill: &str) -> SelectionContext {
        SelectionContext {
            skill_id: Some(skill.to_string()),
            mix: None,
        }
    }

    #[test]
    fn empty_pool_is_terminal_in_every_mode() {
        let sel = selector();
        let est = estimator();
        let history = SessionHistory::new();
        for mode in [
            SelectionMode::Irt,
            SelectionMode::Weakness,
            SelectionMode::Random,
        ] {
            assert!(sel
                .select_next(&[], &history, mode, &skill_ctx("algebra"), &est)
                .is_none());
        }
    }

    #[test]
    fn served_questions_are_never_repeated() {
        let sel = selector();
        let est = estimator();
        let pool = vec![
            question("q1", "algebra", DifficultyLabel::Easy),
            question("q2", "algebra", DifficultyLabel::Medium),
        ];
        let mut history = SessionHistory::new();
        history.record("q1");

        for _ in 0..50 {
            let picked = sel
                .select_next(
                    &pool,
                    &history,
                    SelectionMode::Random,
                    &SelectionContext::default(),
                    &est,
                )
                .unwrap();
            assert_eq!(picked.question.id, "q2");
        }
    }

    #[test]
    fn fully_served_pool_returns_none() {
        let sel = selector();
        let est = estimator();
        let pool = vec![question("q1", "algebra", DifficultyLabel::Easy)];
        let mut history = SessionHistory::new();
        history.record("q1");
        assert!(sel
            .select_next(
                &pool,
                &history,
                SelectionMode::Random,
                &SelectionContext::default(),
                &est,
            )
            .is_none());
    }

    #[test]
    fn irt_picks_closest_to_target_probability() {
        let sel = selector();
        let est = estimator();
        // theta = 0: easy p ≈ 0.69, medium p = 0.50, hard p ≈ 0.23.
        // Target 0.55 -> medium is closest.
        let pool = vec![
            question("easy", "algebra", DifficultyLabel::Easy),
            question("medium", "algebra", DifficultyLabel::Medium),
            question("hard", "algebra", DifficultyLabel::Hard),
        ];
        let picked = sel
            .select_next(
                &pool,
                &SessionHistory::new(),
                SelectionMode::Irt,
                &skill_ctx("algebra"),
                &est,
            )
            .unwrap();
        assert_eq!(picked.question.id, "medium");
        assert_eq!(picked.reason, SelectionReason::Irt);
    }

    #[test]
    fn irt_without_skill_falls_back() {
        let sel = selector();
        let est = estimator();
        let pool = vec![question("q1", "algebra", DifficultyLabel::Medium)];
        let picked = sel
            .select_next(
                &pool,
                &SessionHistory::new(),
                SelectionMode::Irt,
                &SelectionContext::default(),
                &est,
            )
            .unwrap();
        assert_eq!(picked.reason, SelectionReason::FallbackError);
    }

    #[test]
    fn weakness_filters_to_skill() {
        let sel = selector();
        let est = estimator();
        let pool = vec![
            question("q1", "algebra", DifficultyLabel::Medium),
            question("q2", "geometry", DifficultyLabel::Medium),
        ];
        for _ in 0..20 {
            let picked = sel
                .select_next(
                    &pool,
                    &SessionHistory::new(),
                    SelectionMode::Weakness,
                    &skill_ctx("geometry"),
                    &est,
                )
                .unwrap();
            assert_eq!(picked.question.id, "q2");
            assert_eq!(picked.reason, SelectionReason::Weakness);
        }
    }

    #[test]
    fn weakness_with_empty_skill_pool_falls_back_to_full_pool() {
        let sel = selector();
        let est = estimator();
        let pool = vec![question("q1", "algebra", DifficultyLabel::Medium)];
        let picked = sel
            .select_next(
                &pool,
                &SessionHistory::new(),
                SelectionMode::Weakness,
                &skill_ctx("geometry"),
                &est,
            )
            .unwrap();
        assert_eq!(picked.question.id, "q1");
        assert_eq!(picked.reason, SelectionReason::FallbackRandom);
    }

    #[test]
    fn weighted_draw_honors_degenerate_mix() {
        // All weight on hard: a pool containing hard items must yield hard.
        let pool_owned = vec![
            question("e", "s", DifficultyLabel::Easy),
            question("h", "s", DifficultyLabel::Hard),
        ];
        let pool: Vec<&Question> = pool_owned.iter().collect();
        let mix = DifficultyMix {
            easy: 0.0,
            medium: 0.0,
            hard: 1.0,
        };
        for _ in 0..50 {
            let picked = QuestionSelector::weighted_draw(&pool, mix).unwrap();
            assert_eq!(picked.id, "h");
        }
    }

    #[test]
    fn weighted_draw_survives_missing_buckets() {
        // Mix wants mostly medium but only easy exists.
        let pool_owned = vec![question("e", "s", DifficultyLabel::Easy)];
        let pool: Vec<&Question> = pool_owned.iter().collect();
        let picked = QuestionSelector::weighted_draw(&pool, DifficultyMix::default()).unwrap();
        assert_eq!(picked.id, "e");
    }

    #[test]
    fn weighted_draw_on_empty_pool_is_none() {
        assert!(QuestionSelector::weighted_draw(&[], DifficultyMix::default()).is_none());
    }

    #[test]
    fn random_mode_applies_the_context_mix() {
        let sel = selector();
        let est = estimator();
        let pool = vec![
            question("e", "algebra", DifficultyLabel::Easy),
            question("h", "algebra", DifficultyLabel::Hard),
        ];
        let ctx = SelectionContext {
            skill_id: None,
            mix: Some(DifficultyMix {
                easy: 0.0,
                medium: 0.0,
                hard: 1.0,
            }),
        };
        for _ in 0..200 {
            let picked = sel
                .select_next(&pool, &SessionHistory::new(), SelectionMode::Random, &ctx, &est)
                .unwrap();
            assert_eq!(picked.question.difficulty_label, DifficultyLabel::Hard);
            assert_eq!(picked.reason, SelectionReason::Random);
        }
    }
}
