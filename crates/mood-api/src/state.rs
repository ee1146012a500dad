//! Application state.

use std::sync::Arc;

use mood_worker::{Capabilities, JobController, JobManager, StatusStore, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<JobManager>,
}

impl AppState {
    /// Wrap an existing job manager. Creates the upload directory.
    pub fn new(config: ApiConfig, jobs: Arc<JobManager>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.upload_dir)?;
        Ok(Self { config, jobs })
    }

    /// Build the analysis pipeline from the environment.
    pub fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let worker_config = WorkerConfig::from_env()?;
        let capabilities = Capabilities::from_env(&worker_config)?;
        let store = Arc::new(StatusStore::new());
        let controller = JobController::new(worker_config, capabilities, store);
        let jobs = Arc::new(JobManager::new(Arc::new(controller)));

        Ok(Self::new(config, jobs)?)
    }
}
