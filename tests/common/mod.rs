//! Shared test doubles for the integration tests.
//!
//! The harness builds a real `Orchestrator` over an `InMemoryStore`, a
//! scripted provider, recording action handlers, a recording dispatcher and
//! a `ManualClock`, with every document under a temp directory.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use health_sentinel::config::EngineConfig;
use health_sentinel::monitor::SystemSampler;
use health_sentinel::notify::{AdminAccount, Notification, NotificationDispatcher, NotifyError, Role};
use health_sentinel::orchestrator::{Collaborators, Orchestrator};
use health_sentinel::probe::{ModuleCheckProvider, ProbeError};
use health_sentinel::remediation::{ActionError, ActionHandlers};
use health_sentinel::schedule::{Clock, ManualClock};
use health_sentinel::storage::{InMemoryStore, ResultStore};
use health_sentinel::types::{CpuMetrics, HealthCheckResult, HealthStatus, MemoryMetrics};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Monday 2026-03-09 10:00 UTC
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap()
}

/// Per-module queue of scores (`Err` = probe failure). The last entry repeats.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Result<u8, String>>>>,
    clock: Option<Arc<ManualClock>>,
}

impl ScriptedProvider {
    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self {
            scripts: Mutex::default(),
            clock: Some(clock),
        }
    }

    pub fn script(&self, module: &str, outcomes: Vec<Result<u8, String>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(module.to_string(), outcomes.into_iter().collect());
    }
}

#[async_trait]
impl ModuleCheckProvider for ScriptedProvider {
    async fn check(&self, module: &str) -> Result<HealthCheckResult, ProbeError> {
        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts
                .get_mut(module)
                .ok_or_else(|| ProbeError::UnknownModule(module.to_string()))?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        let now = self.clock.as_ref().map_or_else(Utc::now, |c| c.now());
        match next {
            Some(Ok(score)) => Ok(HealthCheckResult::new(module, now, score)),
            Some(Err(cause)) => Err(ProbeError::Failed(cause)),
            None => Err(ProbeError::UnknownModule(module.to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingHandlers {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionHandlers for RecordingHandlers {
    async fn restart_service(&self, target: &str) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(format!("restart:{target}"));
        Ok(())
    }

    async fn clear_cache(&self, target: &str) -> Result<(), ActionError> {
        self.calls.lock().unwrap().push(format!("clear:{target}"));
        Ok(())
    }
}

/// Records `(user_id, notification)` pairs
#[derive(Default)]
pub struct Inbox {
    pub delivered: Mutex<Vec<(String, Notification)>>,
}

impl Inbox {
    pub fn recipients(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _)| u.clone())
            .collect();
        users.sort();
        users
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for Inbox {
    async fn send_to_user(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.delivered
            .lock()
            .unwrap()
            .push((user_id.to_string(), notification.clone()));
        Ok(())
    }
}

pub struct IdleSampler;

impl SystemSampler for IdleSampler {
    fn cpu(&self) -> CpuMetrics {
        CpuMetrics {
            usage_pct: 12.0,
            load: [0.1, 0.1, 0.1],
        }
    }

    fn memory(&self) -> MemoryMetrics {
        MemoryMetrics {
            total_bytes: 1_000,
            used_bytes: 400,
            free_bytes: 600,
            percentage: 40.0,
        }
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub provider: Arc<ScriptedProvider>,
    pub handlers: Arc<RecordingHandlers>,
    pub inbox: Arc<Inbox>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub dir: tempfile::TempDir,
}

pub fn engine_config(dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.paths.data_dir = dir.join("data");
    config.paths.reports_dir = dir.join("reports");
    config.paths.scripts_dir = dir.join("scripts");
    config.remediation.settle_delay_secs = 0;
    config.administrators = vec![
        AdminAccount::new("admin-1", Role::Admin),
        AdminAccount::new("root", Role::SuperAdmin),
        AdminAccount::new("customer", Role::User),
        AdminAccount {
            active: false,
            ..AdminAccount::new("former-admin", Role::Admin)
        },
    ];
    config
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(epoch()));
    let provider = Arc::new(ScriptedProvider::with_clock(clock.clone()));
    let handlers = Arc::new(RecordingHandlers::default());
    let inbox = Arc::new(Inbox::default());
    let store = Arc::new(InMemoryStore::new());

    let orchestrator = Orchestrator::new(
        &engine_config(dir.path()),
        Collaborators {
            provider: provider.clone(),
            handlers: handlers.clone(),
            store: store.clone(),
            dispatcher: inbox.clone(),
            sampler: Arc::new(IdleSampler),
            clock: clock.clone(),
        },
    );

    Harness {
        orchestrator,
        provider,
        handlers,
        inbox,
        store,
        clock,
        dir,
    }
}

/// Persist a classified result directly
pub fn seed(store: &InMemoryStore, module: &str, at: DateTime<Utc>, score: u8, status: HealthStatus) {
    let mut r = HealthCheckResult::new(module, at, score);
    r.status = status;
    store.store_result(&r).unwrap();
}
