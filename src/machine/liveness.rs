//! Liveness guard for views that may be torn down while a transition is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Owned by a view for as long as it is mounted. Dropping it unmounts the view.
#[derive(Debug)]
pub struct ViewLifetime {
    alive: Arc<AtomicBool>,
}

/// Cheap handle checked by completion handlers before delivering a result.
#[derive(Debug, Clone)]
pub struct LivenessToken {
    alive: Arc<AtomicBool>,
}

impl ViewLifetime {
    pub fn mount() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn token(&self) -> LivenessToken {
        LivenessToken {
            alive: Arc::clone(&self.alive),
        }
    }

    pub fn unmount(self) {}
}

impl Drop for ViewLifetime {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl LivenessToken {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
