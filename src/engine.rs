//! Session orchestration.
//!
//! One engine instance serves one learner at a time per session, but holds
//! per-user estimators so repeated sessions keep their proficiency state.
//! Persistence is scheduled on spawned tasks and is never allowed to fail a
//! result that was already computed in memory.

use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::estimator::{AnswerUpdate, ProficiencyEstimator};
use crate::item_bank::{CandidateFilter, ItemBank};
use crate::persistence::ProficiencyStore;
use crate::router::ModuleRouter;
use crate::selector::{QuestionSelector, Selection, SelectionContext, SelectionMode};
use crate::types::{
    AdaptiveResponse, AttemptRecord, DifficultyPath, ModuleResult, Question, SelectionReason,
    SessionHistory, SessionPhase, Subject, WeaknessPattern,
};
use crate::weakness::WeaknessAnalyzer;

pub type SessionHandle = Uuid;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub user_id: String,
    pub subject: Subject,
    pub mode: SelectionMode,
}

#[derive(Debug, Clone)]
pub enum NextQuestion {
    Question {
        question: Question,
        reason: SelectionReason,
    },
    EndOfPool,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub is_correct: bool,
    /// `None` when the estimator degraded for this item (numeric failure);
    /// the answer itself is still graded and archived.
    pub updated_proficiency: Option<AnswerUpdate>,
    /// Present when this answer completed the current module.
    pub module_result: Option<ModuleResult>,
}

#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    pub scaled_score: u32,
    pub next_path: DifficultyPath,
}

struct SessionState {
    user_id: String,
    subject: Subject,
    mode: SelectionMode,
    phase: SessionPhase,
    history: SessionHistory,
    archive: Vec<AdaptiveResponse>,
    served: HashMap<String, Question>,
    module_index: u32,
    module_correct: u32,
    module_total: u32,
    section_correct: u32,
    section_total: u32,
    path: DifficultyPath,
}

impl SessionState {
    fn new(options: SessionOptions) -> Self {
        Self {
            user_id: options.user_id,
            subject: options.subject,
            mode: options.mode,
            phase: SessionPhase::NotStarted,
            history: SessionHistory::new(),
            archive: Vec::new(),
            served: HashMap::new(),
            module_index: 0,
            module_correct: 0,
            module_total: 0,
            section_correct: 0,
            section_total: 0,
            path: DifficultyPath::Baseline,
        }
    }

    fn section_accuracy(&self) -> f64 {
        if self.section_total == 0 {
            0.0
        } else {
            self.section_correct as f64 / self.section_total as f64
        }
    }
}

pub struct AdaptiveEngine {
    config: EngineConfig,
    item_bank: Arc<dyn ItemBank>,
    store: Option<Arc<dyn ProficiencyStore>>,
    router: ModuleRouter,
    selector: QuestionSelector,
    analyzer: WeaknessAnalyzer,
    estimators: RwLock<HashMap<String, Arc<ProficiencyEstimator>>>,
    sessions: RwLock<HashMap<SessionHandle, SessionState>>,
}

impl AdaptiveEngine {
    pub fn new(
        config: EngineConfig,
        item_bank: Arc<dyn ItemBank>,
        store: Option<Arc<dyn ProficiencyStore>>,
    ) -> Self {
        let router = ModuleRouter::new(config.routing.clone());
        let selector = QuestionSelector::new(config.selection.clone());
        let analyzer = WeaknessAnalyzer::new(config.weakness.clone());
        Self {
            config,
            item_bank,
            store,
            router,
            selector,
            analyzer,
            estimators: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &ModuleRouter {
        &self.router
    }

    pub async fn start_session(
        &self,
        options: SessionOptions,
    ) -> Result<SessionHandle, EngineError> {
        if options.user_id.is_empty() {
            return Err(EngineError::validation("userId must not be empty"));
        }
        // Warm the estimator so persisted proficiency is in memory before
        // the first question.
        self.estimator_for(&options.user_id).await;

        let handle = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle, SessionState::new(options));
        tracing::info!(session = %handle, "session started");
        Ok(handle)
    }

    pub async fn session_phase(&self, handle: SessionHandle) -> Result<SessionPhase, EngineError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&handle)
            .map(|s| s.phase)
            .ok_or_else(|| EngineError::session(format!("unknown session {handle}")))
    }

    pub async fn next_question(&self, handle: SessionHandle) -> Result<NextQuestion, EngineError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&handle)
            .ok_or_else(|| EngineError::session(format!("unknown session {handle}")))?;

        match session.phase {
            SessionPhase::NotStarted => session.phase = SessionPhase::Active,
            SessionPhase::Active => {}
            SessionPhase::ModuleComplete => {
                return Err(EngineError::session(
                    "module finished, call completeModule before the next question",
                ));
            }
            SessionPhase::Exhausted | SessionPhase::SessionComplete => {
                return Ok(NextQuestion::EndOfPool);
            }
        }

        let estimator = self.estimator_for(&session.user_id).await;

        let filter = CandidateFilter {
            subject: Some(session.subject),
            exclude_ids: session.history.ids().to_vec(),
            ..Default::default()
        };
        let candidates = self.item_bank.fetch_candidates(&filter).await?;

        let ctx = self.selection_context(session, &estimator, &candidates);
        let selection =
            self.selector
                .select_next(&candidates, &session.history, session.mode, &ctx, &estimator);

        match selection {
            Some(Selection { question, reason }) => {
                session.history.record(&question.id);
                session.served.insert(question.id.clone(), question.clone());
                tracing::debug!(
                    session = %handle,
                    question = %question.id,
                    reason = ?reason,
                    "question served"
                );
                Ok(NextQuestion::Question { question, reason })
            }
            None => {
                session.phase = SessionPhase::Exhausted;
                tracing::info!(session = %handle, "item pool exhausted");
                Ok(NextQuestion::EndOfPool)
            }
        }
    }

    pub async fn submit_answer(
        &self,
        handle: SessionHandle,
        question_id: &str,
        answer_key: &str,
        time_spent_ms: i64,
    ) -> Result<SubmitOutcome, EngineError> {
        if time_spent_ms < 0 {
            return Err(EngineError::validation(format!(
                "timeSpentMs must be non-negative, got {time_spent_ms}"
            )));
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&handle)
            .ok_or_else(|| EngineError::session(format!("unknown session {handle}")))?;
        if session.phase != SessionPhase::Active {
            return Err(EngineError::session(format!(
                "cannot submit an answer in phase {:?}",
                session.phase
            )));
        }

        let question = session.served.remove(question_id).ok_or_else(|| {
            EngineError::validation(format!("question {question_id} was not served"))
        })?;

        let is_correct = answer_key.trim().eq_ignore_ascii_case(&question.correct_answer_key);
        let estimator = self.estimator_for(&session.user_id).await;
        let params = ProficiencyEstimator::item_parameters(question.difficulty_label);

        let update = match estimator.record_answer(
            &question.skill_id,
            question.subject,
            is_correct,
            time_spent_ms,
            &params,
        ) {
            Ok(update) => Some(update),
            Err(EngineError::Estimation(msg)) => {
                // Silent degradation: grading stands, the belief is frozen.
                tracing::warn!(session = %handle, skill = %question.skill_id, error = %msg,
                    "estimation degraded for this answer");
                None
            }
            Err(other) => return Err(other),
        };

        session.archive.push(AdaptiveResponse {
            is_correct,
            time_spent_ms,
            skill_id: question.skill_id.clone(),
            difficulty_label: question.difficulty_label,
            expected_accuracy: update
                .as_ref()
                .map(|u| u.predicted_probability)
                .unwrap_or_else(|| {
                    ProficiencyEstimator::probability(estimator.theta(&question.skill_id), &params)
                }),
        });

        session.module_total += 1;
        session.section_total += 1;
        if is_correct {
            session.module_correct += 1;
            session.section_correct += 1;
        }

        let module_result = if session.module_total >= self.config.session.questions_per_module {
            session.phase = SessionPhase::ModuleComplete;
            Some(ModuleResult::new(
                session.module_correct,
                session.module_total,
                session.path,
            ))
        } else {
            None
        };

        self.schedule_persistence(
            &session.user_id,
            &estimator,
            AttemptRecord {
                user_id: session.user_id.clone(),
                question_id: question.id.clone(),
                skill_id: question.skill_id.clone(),
                is_correct,
                time_spent_ms,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        );

        Ok(SubmitOutcome {
            is_correct,
            updated_proficiency: update,
            module_result,
        })
    }

    /// Grades the current module and routes the continuation. Valid once a
    /// module has filled up (`ModuleComplete`) or mid-module when the caller
    /// force-ends it (timeout), as long as at least one answer exists.
    pub async fn complete_module(
        &self,
        handle: SessionHandle,
    ) -> Result<ModuleOutcome, EngineError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&handle)
            .ok_or_else(|| EngineError::session(format!("unknown session {handle}")))?;

        match session.phase {
            SessionPhase::ModuleComplete => {}
            SessionPhase::Active if session.module_total > 0 => {}
            other => {
                return Err(EngineError::session(format!(
                    "cannot complete a module in phase {other:?}"
                )));
            }
        }

        let result = ModuleResult::new(session.module_correct, session.module_total, session.path);
        let threshold = self.config.routing.threshold_for(session.subject);
        let next_path = self.router.decide_path(&result, threshold);
        let scaled_score = self
            .router
            .scale_score(session.section_accuracy(), self.config.routing.max_section_score);

        session.module_index += 1;
        session.module_correct = 0;
        session.module_total = 0;

        if session.module_index >= self.config.session.module_count {
            session.phase = SessionPhase::SessionComplete;
            // History only exists to prevent repeats; archive it with the
            // session and drop it.
            session.history.clear();
            session.served.clear();
            tracing::info!(session = %handle, scaled_score, "session complete");
        } else {
            session.phase = SessionPhase::Active;
            session.path = next_path;
            tracing::info!(session = %handle, path = next_path.as_str(), "module routed");
        }

        Ok(ModuleOutcome {
            scaled_score,
            next_path,
        })
    }

    pub async fn get_weakness_report(
        &self,
        user_id: &str,
        subject: Option<Subject>,
    ) -> Vec<WeaknessPattern> {
        let estimator = self.estimator_for(user_id).await;
        let skills = estimator.skills(subject);
        self.analyzer.identify_weaknesses(&skills)
    }

    /// Responses archived for a session, in answer order.
    pub async fn session_archive(
        &self,
        handle: SessionHandle,
    ) -> Result<Vec<AdaptiveResponse>, EngineError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&handle)
            .map(|s| s.archive.clone())
            .ok_or_else(|| EngineError::session(format!("unknown session {handle}")))
    }

    fn selection_context(
        &self,
        session: &SessionState,
        estimator: &ProficiencyEstimator,
        candidates: &[Question],
    ) -> SelectionContext {
        let mix = match session.path {
            DifficultyPath::Baseline => self.config.selection.baseline_mix,
            DifficultyPath::Easy => self.config.selection.easy_path_mix,
            DifficultyPath::Hard => self.config.selection.hard_path_mix,
        };

        let skill_id = match session.mode {
            SelectionMode::Random => None,
            SelectionMode::Weakness => self
                .analyzer
                .next_skill_to_focus(&estimator.skills(Some(session.subject)), Some(session.subject)),
            SelectionMode::Irt => self.irt_focus_skill(session, estimator, candidates),
        };

        SelectionContext {
            skill_id,
            mix: Some(mix),
        }
    }

    /// Skill the next information-targeted item should probe: the most
    /// uncertain skill that has not hit a stop condition and still has
    /// unserved candidates. Brand-new sessions draw a skill from the pool.
    fn irt_focus_skill(
        &self,
        session: &SessionState,
        estimator: &ProficiencyEstimator,
        candidates: &[Question],
    ) -> Option<String> {
        let mut best: Option<(String, f64)> = None;
        for skill in estimator.skills(Some(session.subject)) {
            if estimator.should_stop(&skill.skill_id).stop {
                continue;
            }
            if !candidates.iter().any(|q| q.skill_id == skill.skill_id) {
                continue;
            }
            if best.as_ref().map(|(_, s)| skill.sigma > *s).unwrap_or(true) {
                best = Some((skill.skill_id.clone(), skill.sigma));
            }
        }

        best.map(|(id, _)| id).or_else(|| {
            let mut rng = rand::thread_rng();
            candidates.choose(&mut rng).map(|q| q.skill_id.clone())
        })
    }

    async fn estimator_for(&self, user_id: &str) -> Arc<ProficiencyEstimator> {
        if let Some(est) = self.estimators.read().await.get(user_id) {
            return Arc::clone(est);
        }

        let estimator = Arc::new(ProficiencyEstimator::new(self.config.estimator.clone()));
        if let Some(ref store) = self.store {
            match store.load_proficiency(user_id).await {
                Ok(records) if !records.is_empty() => estimator.load(records),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(user_id, error = %err,
                        "failed to load proficiency, starting fresh");
                }
            }
        }

        let mut estimators = self.estimators.write().await;
        Arc::clone(
            estimators
                .entry(user_id.to_string())
                .or_insert(estimator),
        )
    }

    fn schedule_persistence(
        &self,
        user_id: &str,
        estimator: &Arc<ProficiencyEstimator>,
        attempt: AttemptRecord,
    ) {
        let Some(store) = self.store.as_ref().map(Arc::clone) else {
            return;
        };
        let user_id = user_id.to_string();
        let snapshot = estimator.snapshot();
        tokio::spawn(async move {
            if let Err(err) = store.save_proficiency(&user_id, &snapshot).await {
                tracing::warn!(user_id = %user_id, error = %err, "best-effort proficiency save failed");
            }
            if let Err(err) = store.record_attempt(&attempt).await {
                tracing::warn!(user_id = %user_id, error = %err, "best-effort attempt record failed");
            }
        });
    }
}
