use std::sync::Arc;

use tracing::debug;

type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Receives short, human-readable step notifications while a login runs.
#[derive(Clone, Default)]
pub struct Progress {
    callback: Option<Arc<ProgressFn>>,
}

impl Progress {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&self, step: &str) {
        debug!(step, "oauth progress");
        if let Some(callback) = &self.callback {
            callback(step);
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("enabled", &self.callback.is_some())
            .finish()
    }
}
