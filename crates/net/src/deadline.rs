//! Deadlines which may move while something is waiting on them.
//!
//! Tokio streams don't have socket deadlines, so each direction of a connection gets one of these.  Operations run
//! under a [DeadlineWatch] race against the current deadline and re-arm whenever it changes, which is what lets a close
//! cut short a read that is already blocked.
use std::future::Future;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

#[derive(Copy, Clone, Debug, Default)]
struct State {
    at: Option<Instant>,
    /// Once frozen, only [Deadline::freeze] may move the deadline again.
    frozen: bool,
}

#[derive(Debug)]
pub(crate) struct Deadline {
    sender: watch::Sender<State>,
}

pub(crate) struct DeadlineWatch {
    receiver: watch::Receiver<State>,
}

impl Deadline {
    pub(crate) fn new() -> Deadline {
        let (sender, _) = watch::channel(State::default());
        Deadline { sender }
    }

    /// Move the deadline.  `None` means never.  Does nothing once frozen.
    pub(crate) fn set(&self, at: Option<Instant>) {
        self.sender.send_if_modified(|state| {
            if state.frozen {
                return false;
            }
            state.at = at;
            true
        });
    }

    /// Move the deadline and stop [Deadline::set] from moving it again.
    pub(crate) fn freeze(&self, at: Instant) {
        self.sender.send_modify(|state| {
            state.at = Some(at);
            state.frozen = true;
        });
    }

    pub(crate) fn get(&self) -> Option<Instant> {
        self.sender.borrow().at
    }

    pub(crate) fn watch(&self) -> DeadlineWatch {
        DeadlineWatch {
            receiver: self.sender.subscribe(),
        }
    }
}

async fn expire(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

impl DeadlineWatch {
    /// Drive `fut` to completion unless the deadline passes first, in which case `fut` is dropped and this returns
    /// `None`.
    ///
    /// An already expired deadline wins even if `fut` is ready.
    pub(crate) async fn run<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);

        loop {
            let at = self.receiver.borrow_and_update().at;

            tokio::select! {
                biased;
                _ = expire(at) => return None,
                out = &mut fut => return Some(out),
                changed = self.receiver.changed() => {
                    if changed.is_err() {
                        // The deadline can no longer move; stop watching it.
                        return tokio::select! {
                            biased;
                            _ = expire(at) => None,
                            out = &mut fut => Some(out),
                        };
                    }
                }
            }
        }
    }
}
