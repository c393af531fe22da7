//! Peer typing indicator with a quiet-window debounce.
//!
//! Every typing signal pushes the deadline forward; a single timer task
//! per active period clears the flag once the deadline passes without a
//! new signal. The flag only flips while the deadline lock is held, so it
//! is set exactly when a deadline is pending.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::sync::lock;

type ChangeHook = Box<dyn Fn(bool) + Send + Sync>;

struct Inner {
    quiet: Duration,
    deadline: Mutex<Option<Instant>>,
    flag: watch::Sender<bool>,
    on_change: ChangeHook,
}

/// Transient "peer is typing" flag.
#[derive(Clone)]
pub struct TypingIndicator {
    inner: Arc<Inner>,
}

impl fmt::Debug for TypingIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypingIndicator")
            .field("quiet", &self.inner.quiet)
            .field("active", &self.is_active())
            .finish()
    }
}

impl TypingIndicator {
    /// Creates an inactive indicator that clears after `quiet` without
    /// signals. `on_change` runs on every flip of the flag, under the
    /// indicator's lock; it must not call back into the indicator.
    #[must_use]
    pub fn new<F>(quiet: Duration, on_change: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let (flag, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                quiet,
                deadline: Mutex::new(None),
                flag,
                on_change: Box::new(on_change),
            }),
        }
    }

    /// Records one typing signal: sets the flag and restarts the window.
    ///
    /// Must be called within a Tokio runtime.
    pub fn signal(&self) {
        let start_timer = {
            let mut deadline = lock(&self.inner.deadline);
            let idle = deadline.is_none();
            *deadline = Some(Instant::now() + self.inner.quiet);
            if idle {
                self.inner.set(true);
            }
            idle
        };
        if start_timer {
            tokio::spawn(expire(Arc::downgrade(&self.inner)));
        }
    }

    /// Clears the flag immediately.
    pub fn clear(&self) {
        let mut deadline = lock(&self.inner.deadline);
        if deadline.take().is_some() {
            self.inner.set(false);
        }
    }

    /// Returns `true` while the peer is considered typing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.inner.flag.borrow()
    }

    /// Returns a receiver that observes every flip.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.flag.subscribe()
    }
}

impl Inner {
    fn set(&self, active: bool) {
        if self.flag.send_replace(active) != active {
            (self.on_change)(active);
        }
    }
}

/// Sleeps until the current deadline; re-sleeps while signals keep
/// pushing it forward.
async fn expire(inner: Weak<Inner>) {
    loop {
        let target = {
            let Some(strong) = inner.upgrade() else {
                return;
            };
            let Some(target) = *lock(&strong.deadline) else {
                return;
            };
            target
        };
        tokio::time::sleep_until(target).await;

        let Some(strong) = inner.upgrade() else {
            return;
        };
        let mut deadline = lock(&strong.deadline);
        match *deadline {
            Some(current) if current <= Instant::now() => {
                *deadline = None;
                strong.set(false);
                return;
            }
            Some(_) => {}
            None => return,
        }
    }
}
