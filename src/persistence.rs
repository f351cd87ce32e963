//! Persistence contract and reference stores.
//!
//! Every call here is best-effort from the engine's point of view: a failed
//! save or load is logged and the session keeps operating on in-memory
//! state. A session must stay fully usable with persistence down for its
//! entire duration.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::types::{AttemptRecord, SkillProficiency};

#[async_trait]
pub trait ProficiencyStore: Send + Sync {
    async fn load_proficiency(&self, user_id: &str)
        -> Result<Vec<SkillProficiency>, EngineError>;

    async fn save_proficiency(
        &self,
        user_id: &str,
        skills: &[SkillProficiency],
    ) -> Result<(), EngineError>;

    async fn record_attempt(&self, attempt: &AttemptRecord) -> Result<(), EngineError>;
}

/// HashMap-backed store, mainly for tests.
#[derive(Default)]
pub struct MemoryStore {
    skills: RwLock<HashMap<String, Vec<SkillProficiency>>>,
    attempts: RwLock<Vec<AttemptRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attempt_count(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl ProficiencyStore for MemoryStore {
    async fn load_proficiency(
        &self,
        user_id: &str,
    ) -> Result<Vec<SkillProficiency>, EngineError> {
        Ok(self
            .skills
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_proficiency(
        &self,
        user_id: &str,
        skills: &[SkillProficiency],
    ) -> Result<(), EngineError> {
        self.skills
            .write()
            .await
            .insert(user_id.to_string(), skills.to_vec());
        Ok(())
    }

    async fn record_attempt(&self, attempt: &AttemptRecord) -> Result<(), EngineError> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }
}

/// One JSON document per user under a directory. Attempts append to a
/// per-user JSON-lines file.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn skills_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.skills.json"))
    }

    fn attempts_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.attempts.jsonl"))
    }
}

#[async_trait]
impl ProficiencyStore for JsonFileStore {
    async fn load_proficiency(
        &self,
        user_id: &str,
    ) -> Result<Vec<SkillProficiency>, EngineError> {
        let path = self.skills_path(user_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::Persistence(format!("corrupt skill file: {e}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(EngineError::Persistence(format!(
                "read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn save_proficiency(
        &self,
        user_id: &str,
        skills: &[SkillProficiency],
    ) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let json = serde_json::to_vec_pretty(skills)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        tokio::fs::write(self.skills_path(user_id), json)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    async fn record_attempt(&self, attempt: &AttemptRecord) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let mut line = serde_json::to_vec(attempt)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        line.push(b'\n');

        let path = self.attempts_path(&attempt.user_id);
        let existing = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(EngineError::Persistence(err.to_string())),
        };
        let mut combined = existing;
        combined.extend_from_slice(&line);
        tokio::fs::write(&path, combined)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }
}
