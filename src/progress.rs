//! Cycling status messages shown while a video renders.
//!
//! Purely presentational: the ticker holds no job state and never touches the
//! poll loop. It runs on its own task and stops when dropped. Once `stop`
//! returns, no callback is running and none will start, even on a
//! multi-threaded runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default cadence between messages.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5);

const MIN_STATUS_INTERVAL: Duration = Duration::from_millis(1);

/// Messages cycled through while waiting on a video.
pub const DEFAULT_STATUS_MESSAGES: &[&str] = &[
    "Warming up the virtual cameras...",
    "Adjusting the lighting and focus...",
    "Directing the digital actors...",
    "Compositing the scenes...",
    "Rendering the final cut...",
    "Adding special effects...",
    "This might take a few minutes, great art takes time!",
];

/// Callback receiving each status message.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Periodic status emitter. Dropping it stops the timer.
pub struct ProgressTicker {
    handle: Option<JoinHandle<()>>,
    // Held while a callback runs; `false` once stopped.
    active: Arc<Mutex<bool>>,
}

impl ProgressTicker {
    /// Emit `messages[0]` right away, then the next message every `period`,
    /// wrapping around at the end of the list.
    ///
    /// Must be called from within a tokio runtime. An empty list yields an
    /// inert ticker. Periods below 1 ms are raised to 1 ms.
    pub fn start(messages: Vec<String>, period: Duration, on_status: StatusCallback) -> Self {
        let active = Arc::new(Mutex::new(false));
        if messages.is_empty() {
            return Self {
                handle: None,
                active,
            };
        }
        on_status(&messages[0]);
        *lock(&active) = true;

        let period = period.max(MIN_STATUS_INTERVAL);
        let gate = Arc::clone(&active);
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut index = 0;
            loop {
                ticks.tick().await;
                let running = lock(&gate);
                if !*running {
                    break;
                }
                index = (index + 1) % messages.len();
                on_status(&messages[index]);
            }
        });

        Self {
            handle: Some(handle),
            active,
        }
    }

    /// Stop emitting. Also happens on drop.
    ///
    /// Waits for a callback that is already running on another worker.
    pub fn stop(&mut self) {
        *lock(&self.active) = false;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

// A panicking status callback must not stop the ticker from shutting down.
fn lock(flag: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The default message list as owned strings.
pub fn default_messages() -> Vec<String> {
    DEFAULT_STATUS_MESSAGES.iter().map(|s| s.to_string()).collect()
}
