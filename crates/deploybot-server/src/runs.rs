use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Mention,
    Webhook,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub app: String,
    pub trigger: RunTrigger,
    pub started_at: String,
}

/// One in-flight run per application.
///
/// Acquiring returns a [`RunGuard`]; the slot frees when the guard drops,
/// including when the run's task panics.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashMap<String, RunRecord>>>,
}

impl RunRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunRecord>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` when `app` already has a run in flight.
    pub fn try_acquire(&self, app: &str, trigger: RunTrigger) -> Option<RunGuard> {
        let mut active = self.lock();
        if active.contains_key(app) {
            return None;
        }
        let record = RunRecord {
            id: uuid::Uuid::new_v4().to_string(),
            app: app.to_string(),
            trigger,
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        active.insert(app.to_string(), record.clone());
        Some(RunGuard {
            registry: self.clone(),
            record,
        })
    }

    pub fn is_running(&self, app: &str) -> bool {
        self.lock().contains_key(app)
    }

    /// Active runs, oldest first.
    pub fn active(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.lock().values().cloned().collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.app.cmp(&b.app)));
        runs
    }
}

#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    record: RunRecord,
}

impl RunGuard {
    pub fn record(&self) -> &RunRecord {
        &self.record
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.registry.lock();
        if active
            .get(&self.record.app)
            .is_some_and(|r| r.id == self.record.id)
        {
            active.remove(&self.record.app);
        }
    }
}
