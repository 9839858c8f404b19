//! The reveal cadence: a repeating timer that advances the typing queue one
//! token per tick. All sequencing lives in the queue itself; this task only
//! supplies the clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use mentor_core::typing::TickOutcome;

use crate::engine::LearnEngine;

/// Owns the interval task driving the typewriter. Dropping the driver stops
/// the reveal; already-revealed text stays as it is.
pub struct TypewriterDriver {
    handle: JoinHandle<()>,
}

impl TypewriterDriver {
    /// Start ticking the engine's typing queue at the given cadence.
    #[must_use]
    pub fn spawn(engine: Arc<LearnEngine>, speed: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(speed);
            // A missed tick means the loop fell behind; catching up in a
            // burst would defeat the reveal pacing.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let TickOutcome::Finished { block_id } = engine.tick_typing() {
                    debug!(%block_id, "block reveal complete");
                }
            }
        });
        Self { handle }
    }

    /// Stop the reveal task.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for TypewriterDriver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
