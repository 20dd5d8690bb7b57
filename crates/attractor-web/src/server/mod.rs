//! Shared HTTP-layer state: one [`Session`] per in-flight pipeline run.

pub mod pipeline;
pub mod stream;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use attractor_pipeline::WebInterviewer;

/// Per-run state the HTTP layer needs beyond the runner itself: the
/// Web-interviewer a running `wait_human` stage suspends on.
pub struct Session {
    pub interviewer: Arc<WebInterviewer>,
}

/// Shared application state: one [`Session`] per in-flight pipeline id.
#[derive(Clone, Default)]
pub struct AppState {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl AppState {
    pub fn insert(&self, pipeline_id: String, session: Arc<Session>) {
        self.sessions.write().unwrap().insert(pipeline_id, session);
    }

    pub fn get(&self, pipeline_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().unwrap().get(pipeline_id).cloned()
    }

    pub fn remove(&self, pipeline_id: &str) {
        self.sessions.write().unwrap().remove(pipeline_id);
    }
}
