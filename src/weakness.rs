//! Weakness detection over per-skill proficiency records.
//!
//! A skill is only scored once it has enough attempts to be evidence rather
//! than noise; the score is the gap between the configured mastery bar and
//! the skill's recent accuracy.

use crate::config::WeaknessConfig;
use crate::types::{SkillProficiency, Subject, WeaknessPattern};

pub struct WeaknessAnalyzer {
    config: WeaknessConfig,
}

impl WeaknessAnalyzer {
    pub fn new(config: WeaknessConfig) -> Self {
        Self { config }
    }

    fn eligible(&self, skill: &SkillProficiency) -> bool {
        skill.attempts >= self.config.min_attempts
    }

    fn score(&self, skill: &SkillProficiency) -> f64 {
        (self.config.target_accuracy - skill.recent_accuracy).max(0.0)
    }

    /// Ranked weakness patterns, weakest first. Skills below the attempts
    /// gate are excluded entirely, not scored as zero.
    pub fn identify_weaknesses(&self, skills: &[SkillProficiency]) -> Vec<WeaknessPattern> {
        let mut patterns: Vec<(WeaknessPattern, u32)> = skills
            .iter()
            .filter(|s| self.eligible(s))
            .map(|s| {
                (
                    WeaknessPattern {
                        skill_id: s.skill_id.clone(),
                        weakness_score: self.score(s),
                    },
                    s.attempts,
                )
            })
            .collect();

        patterns.sort_by(|(a, a_attempts), (b, b_attempts)| {
            b.weakness_score
                .partial_cmp(&a.weakness_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a_attempts.cmp(b_attempts))
        });

        patterns.into_iter().map(|(p, _)| p).collect()
    }

    /// Single weakest eligible skill for the subject, or `None` when no
    /// skill qualifies (callers should fall back to random selection).
    pub fn next_skill_to_focus(
        &self,
        skills: &[SkillProficiency],
        subject: Option<Subject>,
    ) -> Option<String> {
        skills
            .iter()
            .filter(|s| subject.map(|sub| s.subject == sub).unwrap_or(true))
            .filter(|s| self.eligible(s))
            .max_by(|a, b| {
                self.score(a)
                    .partial_cmp(&self.score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Ties go to the skill with less evidence.
                    .then(b.attempts.cmp(&a.attempts))
            })
            .map(|s| s.skill_id.clone())
    }
}
