//! Pause and cancel signals for one prefetch run.

use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared pause flag. Workers hold a [`PauseWaiter`] each.
#[derive(Debug)]
pub(crate) struct PauseGate {
    tx: watch::Sender<bool>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Returns `false` if already paused.
    pub fn pause(&self) -> bool {
        self.tx.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    /// Returns `false` if not paused.
    pub fn resume(&self) -> bool {
        self.tx.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn waiter(&self) -> PauseWaiter {
        PauseWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct PauseWaiter {
    rx: watch::Receiver<bool>,
}

impl PauseWaiter {
    /// Blocks while paused, waking on every change and at least every `poll`.
    ///
    /// Returns `false` if the run was cancelled before or during the wait.
    pub async fn wait_while_paused(&mut self, cancel: &CancellationToken, poll: Duration) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if !*self.rx.borrow_and_update() {
                return true;
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = self.rx.changed() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

/// Signals of the active run.
#[derive(Debug)]
pub(crate) struct RunControl {
    pub cancel: CancellationToken,
    pub pause: PauseGate,
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            pause: PauseGate::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
