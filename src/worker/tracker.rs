use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Join handles of spawned runner tasks, so graceful shutdown can wait for
/// every runner to reach its between-batches stop point.
pub struct RunnerTracker {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RunnerTracker {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Track a runner task, dropping handles of runners that have already
    /// finished so the list does not grow for the life of the process
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().expect("runner tracker lock poisoned");
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Drain the tracked handles for joining; also drops handles of tasks
    /// that already finished
    pub fn take_handles(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.handles.lock().expect("runner tracker lock poisoned");
        handles.drain(..).collect()
    }
}

impl Default for RunnerTracker {
    fn default() -> Self {
        Self::new()
    }
}
