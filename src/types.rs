use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    Verbal,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::Verbal => "verbal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "math" => Some(Self::Math),
            "verbal" => Some(Self::Verbal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLabel {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl DifficultyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }
}

/// 2PL item parameters. `discrimination` must be positive; both values are
/// immutable once derived for an item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParameters {
    pub discrimination: f64,
    pub difficulty: f64,
}

impl ItemParameters {
    pub fn new(discrimination: f64, difficulty: f64) -> Self {
        Self {
            discrimination,
            difficulty,
        }
    }
}

/// Per-(user, skill) ability estimate. Owned by the estimator and mutated
/// only through `record_answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillProficiency {
    pub skill_id: String,
    pub subject: Subject,
    pub theta: f64,
    pub sigma: f64,
    pub attempts: u32,
    pub recent_accuracy: f64,
    pub last_updated: i64,
    #[serde(default)]
    pub consecutive_correct: u32,
    #[serde(default)]
    pub recent_outcomes: VecDeque<bool>,
}

impl SkillProficiency {
    pub fn new(skill_id: impl Into<String>, subject: Subject) -> Self {
        Self {
            skill_id: skill_id.into(),
            subject,
            theta: 0.0,
            sigma: 1.0,
            attempts: 0,
            recent_accuracy: 0.0,
            last_updated: chrono::Utc::now().timestamp_millis(),
            consecutive_correct: 0,
            recent_outcomes: VecDeque::new(),
        }
    }
}

/// One answered item, archived append-only into the session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveResponse {
    pub is_correct: bool,
    pub time_spent_ms: i64,
    pub skill_id: String,
    pub difficulty_label: DifficultyLabel,
    /// Model-predicted probability of correctness at the time of answering.
    pub expected_accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaknessPattern {
    pub skill_id: String,
    /// Higher = weaker.
    pub weakness_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyPath {
    #[default]
    Baseline,
    Easy,
    Hard,
}

impl DifficultyPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Easy => "easy",
            Self::Hard => "hard",
        }
    }
}

/// Tally for one completed module. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResult {
    pub correct_count: u32,
    pub total_questions: u32,
    pub performance: f64,
    pub difficulty_path: DifficultyPath,
}

impl ModuleResult {
    pub fn new(correct_count: u32, total_questions: u32, difficulty_path: DifficultyPath) -> Self {
        let performance = if total_questions > 0 {
            correct_count as f64 / total_questions as f64
        } else {
            0.0
        };
        Self {
            correct_count,
            total_questions,
            performance: performance.clamp(0.0, 1.0),
            difficulty_path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub skill_id: String,
    pub subject: Subject,
    pub difficulty_label: DifficultyLabel,
    pub correct_answer_key: String,
}

/// Why a question was chosen. Fallback variants are distinct so callers and
/// tests can audit degraded selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Weakness,
    Irt,
    Random,
    FallbackRandom,
    FallbackError,
}

impl SelectionReason {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackRandom | Self::FallbackError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    BudgetExhausted,
    Mastery,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopDecision {
    pub stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StopReason>,
}

impl StopDecision {
    pub fn go_on() -> Self {
        Self {
            stop: false,
            reason: None,
        }
    }

    pub fn because(reason: StopReason) -> Self {
        Self {
            stop: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    Active,
    ModuleComplete,
    Exhausted,
    SessionComplete,
}

/// Ordered record of the item ids already served in a session. Exists only
/// to prevent repeats; cleared when the session ends.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    served: Vec<String>,
    seen: std::collections::HashSet<String>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question_id: impl Into<String>) {
        let id = question_id.into();
        if self.seen.insert(id.clone()) {
            self.served.push(id);
        }
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.seen.contains(question_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.served
    }

    pub fn len(&self) -> usize {
        self.served.len()
    }

    pub fn is_empty(&self) -> bool {
        self.served.is_empty()
    }

    pub fn clear(&mut self) {
        self.served.clear();
        self.seen.clear();
    }
}

/// One recorded attempt, handed to the persistence collaborator best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub user_id: String,
    pub question_id: String,
    pub skill_id: String,
    pub is_correct: bool,
    pub time_spent_ms: i64,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_label_parse_defaults_to_medium() {
        assert_eq!(DifficultyLabel::parse("EASY"), DifficultyLabel::Easy);
        assert_eq!(DifficultyLabel::parse("hard"), DifficultyLabel::Hard);
        assert_eq!(DifficultyLabel::parse("???"), DifficultyLabel::Medium);
    }

    #[test]
    fn module_result_performance_bounded() {
        let result = ModuleResult::new(19, 27, DifficultyPath::Baseline);
        assert!(result.performance > 0.70 && result.performance < 0.71);

        let empty = ModuleResult::new(0, 0, DifficultyPath::Baseline);
        assert_eq!(empty.performance, 0.0);
    }

    #[test]
    fn skill_proficiency_roundtrip() {
        let skill = SkillProficiency::new("algebra", Subject::Math);
        let json = serde_json::to_value(&skill).unwrap();
        let restored: SkillProficiency = serde_json::from_value(json).unwrap();
        assert_eq!(restored.skill_id, "algebra");
        assert_eq!(restored.attempts, 0);
        assert!((restored.sigma - 1.0).abs() < 1e-12);
    }

    #[test]
    fn selection_reason_fallback_flag() {
        assert!(SelectionReason::FallbackRandom.is_fallback());
        assert!(SelectionReason::FallbackError.is_fallback());
        assert!(!SelectionReason::Irt.is_fallback());
    }
}
