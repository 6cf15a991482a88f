// Re-armable quiet-period timer for the commit loop.
//
// Every accepted event pushes the deadline out by the full window; the
// timer fires once after the last event and then stays idle until armed
// again.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Instant, Sleep};

pub struct DebounceTimer {
    window: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl DebounceTimer {
    pub fn new(window: Duration) -> Self {
        Self { window, sleep: Box::pin(tokio::time::sleep(window)), armed: false }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Cancel any pending deadline and start a fresh window.
    pub fn arm(&mut self) {
        self.arm_after(self.window);
    }

    /// Like `arm`, with a one-off delay in place of the window.
    pub fn arm_after(&mut self, delay: Duration) {
        self.sleep.as_mut().reset(Instant::now() + delay);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completes when the window elapses without another `arm`. Pending
    /// forever while disarmed, so it is safe inside `select!`.
    pub fn expired(&mut self) -> Expired<'_> {
        Expired { timer: self }
    }
}

impl std::fmt::Debug for DebounceTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceTimer")
            .field("window", &self.window)
            .field("armed", &self.armed)
            .field("deadline", &self.sleep.deadline())
            .finish()
    }
}

pub struct Expired<'a> {
    timer: &'a mut DebounceTimer,
}

impl Future for Expired<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let timer = &mut *self.get_mut().timer;
        if !timer.armed {
            return Poll::Pending;
        }
        match timer.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                timer.armed = false;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
