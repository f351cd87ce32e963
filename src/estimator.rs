//! Proficiency estimation over a 2-parameter-logistic response model.
//!
//! Each skill carries a Gaussian ability belief (theta, sigma). An answer
//! moves theta by a single Bayesian-modal step and shrinks sigma by the
//! precision-accumulation rule, so uncertainty never increases with
//! evidence.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EstimatorConfig;
use crate::error::EngineError;
use crate::types::{
    DifficultyLabel, ItemParameters, SkillProficiency, StopDecision, StopReason, Subject,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerUpdate {
    pub theta: f64,
    pub sigma: f64,
    /// 2PL probability of a correct answer, evaluated before the update.
    pub predicted_probability: f64,
    /// Fisher information of the item at the pre-update theta.
    pub information_gain: f64,
}

/// Per-user estimator. Skills update independently; same-skill updates are
/// serialized through a per-skill mutex because the theta/sigma step is a
/// non-commutative read-modify-write.
pub struct ProficiencyEstimator {
    config: EstimatorConfig,
    skills: RwLock<HashMap<String, Arc<Mutex<SkillProficiency>>>>,
}

impl ProficiencyEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            skills: RwLock::new(HashMap::new()),
        }
    }

    pub fn probability(theta: f64, params: &ItemParameters) -> f64 {
        let z = (params.discrimination * (theta - params.difficulty)).clamp(-20.0, 20.0);
        1.0 / (1.0 + (-z).exp())
    }

    pub fn fisher_information(discrimination: f64, p: f64) -> f64 {
        discrimination * discrimination * p * (1.0 - p)
    }

    /// Fixed difficulty-label calibration used when the item bank supplies
    /// no parameters of its own.
    pub fn item_parameters(label: DifficultyLabel) -> ItemParameters {
        match label {
            DifficultyLabel::Easy => ItemParameters::new(0.8, -1.0),
            DifficultyLabel::Medium => ItemParameters::new(1.0, 0.0),
            DifficultyLabel::Hard => ItemParameters::new(1.2, 1.0),
        }
    }

    pub fn record_answer(
        &self,
        skill_id: &str,
        subject: Subject,
        is_correct: bool,
        time_spent_ms: i64,
        params: &ItemParameters,
    ) -> Result<AnswerUpdate, EngineError> {
        if params.discrimination <= 0.0 {
            return Err(EngineError::validation(format!(
                "item discrimination must be positive, got {}",
                params.discrimination
            )));
        }
        if time_spent_ms < 0 {
            return Err(EngineError::validation(format!(
                "timeSpentMs must be non-negative, got {time_spent_ms}"
            )));
        }

        let skill = self.get_or_insert(skill_id, subject);
        let mut skill = skill.lock();

        let p = Self::probability(skill.theta, params);
        let y = if is_correct { 1.0 } else { 0.0 };

        let step = (skill.sigma * skill.sigma * params.discrimination * (y - p))
            .clamp(-self.config.max_step, self.config.max_step);
        let new_theta = skill.theta + step;

        let info = Self::fisher_information(params.discrimination, p);
        let new_sigma = (skill.sigma / (1.0 + info * skill.sigma * skill.sigma).sqrt())
            .max(self.config.sigma_floor);

        if !new_theta.is_finite() || !new_sigma.is_finite() || !p.is_finite() {
            tracing::warn!(
                skill_id,
                theta = skill.theta,
                sigma = skill.sigma,
                "non-finite estimation step, leaving skill state unchanged"
            );
            return Err(EngineError::estimation(format!(
                "non-finite update for skill {skill_id}"
            )));
        }

        skill.theta = new_theta;
        // More evidence cannot increase uncertainty.
        skill.sigma = new_sigma.min(skill.sigma);
        skill.attempts += 1;
        skill.consecutive_correct = if is_correct {
            skill.consecutive_correct + 1
        } else {
            0
        };
        skill.recent_outcomes.push_back(is_correct);
        while skill.recent_outcomes.len() > self.config.accuracy_window {
            skill.recent_outcomes.pop_front();
        }
        let correct = skill.recent_outcomes.iter().filter(|&&c| c).count();
        skill.recent_accuracy = correct as f64 / skill.recent_outcomes.len() as f64;
        skill.last_updated = chrono::Utc::now().timestamp_millis();

        tracing::debug!(
            skill_id,
            theta = skill.theta,
            sigma = skill.sigma,
            predicted = p,
            "recorded answer"
        );

        Ok(AnswerUpdate {
            theta: skill.theta,
            sigma: skill.sigma,
            predicted_probability: p,
            information_gain: info,
        })
    }

    pub fn should_stop(&self, skill_id: &str) -> StopDecision {
        let skills = self.skills.read();
        let Some(skill) = skills.get(skill_id) else {
            return StopDecision::go_on();
        };
        let skill = skill.lock();

        if skill.sigma <= self.config.convergence_threshold {
            return StopDecision::because(StopReason::Converged);
        }
        if skill.attempts >= self.config.max_items_per_skill {
            return StopDecision::because(StopReason::BudgetExhausted);
        }
        if skill.theta >= self.config.mastery_theta
            && skill.consecutive_correct >= self.config.mastery_streak
        {
            return StopDecision::because(StopReason::Mastery);
        }

        StopDecision::go_on()
    }

    /// Current theta for a skill, 0.0 for skills never seen.
    pub fn theta(&self, skill_id: &str) -> f64 {
        self.skills
            .read()
            .get(skill_id)
            .map(|s| s.lock().theta)
            .unwrap_or(0.0)
    }

    pub fn skills(&self, subject: Option<Subject>) -> Vec<SkillProficiency> {
        let skills = self.skills.read();
        let mut out: Vec<SkillProficiency> = skills
            .values()
            .map(|s| s.lock().clone())
            .filter(|s| subject.map(|sub| s.subject == sub).unwrap_or(true))
            .collect();
        out.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        out
    }

    pub fn snapshot(&self) -> Vec<SkillProficiency> {
        self.skills(None)
    }

    /// Replace in-memory state with persisted records, e.g. at session start.
    pub fn load(&self, records: Vec<SkillProficiency>) {
        let mut skills = self.skills.write();
        skills.clear();
        for record in records {
            skills.insert(record.skill_id.clone(), Arc::new(Mutex::new(record)));
        }
    }

    fn get_or_insert(&self, skill_id: &str, subject: Subject) -> Arc<Mutex<SkillProficiency>> {
        if let Some(skill) = self.skills.read().get(skill_id) {
            return Arc::clone(skill);
        }
        let mut skills = self.skills.write();
        Arc::clone(
            skills
                .entry(skill_id.to_string())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(SkillProficiency::new(skill_id, subject)))
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ProficiencyEstimator {
        ProficiencyEstimator::new(EstimatorConfig::default())
    }

    fn medium() -> ItemParameters {
        ProficiencyEstimator::item_parameters(DifficultyLabel::Medium)
    }

    #[test]
    fn probability_range() {
        for theta in [-3.0, -1.0, 0.0, 1.0, 3.0] {
            for label in [
                DifficultyLabel::Easy,
                DifficultyLabel::Medium,
                DifficultyLabel::Hard,
            ] {
                let p = ProficiencyEstimator::probability(
                    theta,
                    &ProficiencyEstimator::item_parameters(label),
                );
                assert!(p > 0.0 && p < 1.0, "p={p} for theta={theta}");
            }
        }
    }

    #[test]
    fn rejects_non_positive_discrimination() {
        let est = estimator();
        let bad = ItemParameters::new(0.0, 0.0);
        let err = est
            .record_answer("algebra", Subject::Math, true, 1000, &bad)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(est.skills(None).is_empty(), "no state on rejected call");
    }

    #[test]
    fn rejects_negative_time() {
        let est = estimator();
        let err = est
            .record_answer("algebra", Subject::Math, true, -1, &medium())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn correct_answer_raises_theta() {
        let est = estimator();
        let update = est
            .record_answer("algebra", Subject::Math, true, 2000, &medium())
            .unwrap();
        assert!(update.theta > 0.0);
        assert!(update.sigma < 1.0);
        assert!((update.predicted_probability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn incorrect_answer_lowers_theta() {
        let est = estimator();
        let update = est
            .record_answer("algebra", Subject::Math, false, 2000, &medium())
            .unwrap();
        assert!(update.theta < 0.0);
    }

    #[test]
    fn sigma_never_increases() {
        let est = estimator();
        let mut last_sigma = 1.0;
        for i in 0..20 {
            let update = est
                .record_answer("algebra", Subject::Math, i % 3 != 0, 1500, &medium())
                .unwrap();
            assert!(
                update.sigma <= last_sigma + 1e-12,
                "sigma increased: {} -> {}",
                last_sigma,
                update.sigma
            );
            last_sigma = update.sigma;
        }
        assert!(last_sigma >= EstimatorConfig::default().sigma_floor);
    }

    #[test]
    fn surprising_correct_answers_move_theta_more() {
        // Same item, very different priors: a correct answer predicted at
        // p < 0.5 must move theta more than one predicted at p > 0.9.
        let est_low = estimator();
        est_low.load(vec![{
            let mut s = SkillProficiency::new("skill", Subject::Math);
            s.theta = -1.0;
            s
        }]);
        let est_high = estimator();
        est_high.load(vec![{
            let mut s = SkillProficiency::new("skill", Subject::Math);
            s.theta = 3.0;
            s
        }]);

        let hard = ProficiencyEstimator::item_parameters(DifficultyLabel::Hard);
        let low = est_low
            .record_answer("skill", Subject::Math, true, 1000, &hard)
            .unwrap();
        let high = est_high
            .record_answer("skill", Subject::Math, true, 1000, &hard)
            .unwrap();

        assert!(low.predicted_probability < 0.5);
        assert!(high.predicted_probability > 0.9);
        assert!((low.theta - -1.0) > (high.theta - 3.0));
    }

    #[test]
    fn step_is_clipped() {
        let est = estimator();
        est.load(vec![{
            let mut s = SkillProficiency::new("skill", Subject::Math);
            s.theta = -3.0;
            s.sigma = 1.0;
            s
        }]);
        let hard = ProficiencyEstimator::item_parameters(DifficultyLabel::Hard);
        let update = est
            .record_answer("skill", Subject::Math, true, 1000, &hard)
            .unwrap();
        assert!(update.theta - -3.0 <= EstimatorConfig::default().max_step + 1e-12);
    }

    #[test]
    fn should_stop_on_budget() {
        let config = EstimatorConfig {
            max_items_per_skill: 3,
            convergence_threshold: 0.01,
            ..Default::default()
        };
        let est = ProficiencyEstimator::new(config);
        for _ in 0..3 {
            est.record_answer("skill", Subject::Verbal, false, 1000, &medium())
                .unwrap();
        }
        let decision = est.should_stop("skill");
        assert!(decision.stop);
        assert_eq!(decision.reason, Some(StopReason::BudgetExhausted));
    }

    #[test]
    fn should_stop_on_mastery() {
        let config = EstimatorConfig {
            mastery_theta: 0.5,
            mastery_streak: 3,
            convergence_threshold: 0.01,
            ..Default::default()
        };
        let est = ProficiencyEstimator::new(config);
        for _ in 0..4 {
            est.record_answer("skill", Subject::Math, true, 1000, &medium())
                .unwrap();
        }
        let decision = est.should_stop("skill");
        assert!(decision.stop);
        assert_eq!(decision.reason, Some(StopReason::Mastery));
    }

    #[test]
    fn unknown_skill_does_not_stop() {
        let est = estimator();
        assert!(!est.should_stop("nope").stop);
    }

    #[test]
    fn three_correct_medium_answers_scenario() {
        let est = estimator();
        let mut theta = 0.0;
        let mut sigma = 1.0;
        for _ in 0..3 {
            let update = est
                .record_answer("skill", Subject::Math, true, 1200, &medium())
                .unwrap();
            assert!(update.theta > theta, "theta must strictly increase");
            assert!(update.sigma < sigma, "sigma must strictly decrease");
            theta = update.theta;
            sigma = update.sigma;
        }
        let decision = est.should_stop("skill");
        if sigma > EstimatorConfig::default().convergence_threshold {
            assert!(!decision.stop);
        }
    }

    #[test]
    fn recent_accuracy_is_windowed() {
        let config = EstimatorConfig {
            accuracy_window: 4,
            max_items_per_skill: 100,
            ..Default::default()
        };
        let est = ProficiencyEstimator::new(config);
        for _ in 0..6 {
            est.record_answer("skill", Subject::Math, false, 1000, &medium())
                .unwrap();
        }
        for _ in 0..4 {
            est.record_answer("skill", Subject::Math, true, 1000, &medium())
                .unwrap();
        }
        let skill = &est.skills(None)[0];
        assert!((skill.recent_accuracy - 1.0).abs() < 1e-12);
        assert_eq!(skill.attempts, 10);
    }
}
