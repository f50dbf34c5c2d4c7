//! The correlator: track pending actions by correlation token, and
//! route each incoming packet to zero or one waiters, or emit it as a
//! spontaneous event.
//!
//! State is a plain `HashMap` behind a `std::sync::Mutex` — the critical
//! section never awaits, so there's no need for a `tokio::sync::Mutex` here.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::action::CallResult;
use crate::error::AmiError;
use crate::packet::Packet;
use crate::shape::{AmiValue, ShapeOutcome, ShapeState};

/// Where a completed action's result goes.
pub enum CompletionSink {
    /// The blocking call style: a waiter parked on a oneshot receiver.
    Oneshot(oneshot::Sender<Result<AmiValue, AmiError>>),
    /// The completion-callback call style: invoked on the reader's dispatch
    /// context once, after the correlator's lock has been released.
    Callback(Box<dyn FnOnce(CallResult) + Send>),
}

struct PendingAction {
    token: String,
    state: ShapeState,
    sink: CompletionSink,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<String, PendingAction>,
    /// FIFO of tokens awaiting the "no ActionID echoed" fallback routing,
    /// for servers that omit `ActionID` on some responses or list-item
    /// events. A token stays here for its whole lifetime — even once the
    /// server is seen to echo its ActionID, a later packet for the same
    /// action (e.g. a list's item/terminator events) may still omit it —
    /// and is only removed once its action actually completes.
    current: VecDeque<String>,
}

/// Registry of pending actions, shared between the transport's reader loop
/// and every task that calls into the action surface.
#[derive(Default)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    pub fn new() -> Self {
        Correlator::default()
    }

    /// Register a freshly-written action. Must be called before (or
    /// atomically with) the request hitting the wire, so that any reply
    /// racing the registration is still routed correctly.
    pub fn register(&self, token: String, state: ShapeState, sink: CompletionSink) {
        let mut inner = self.inner.lock().unwrap();
        inner.current.push_back(token.clone());
        inner.pending.insert(
            token.clone(),
            PendingAction {
                token,
                state,
                sink,
            },
        );
    }

    /// Route one incoming packet. Returns `Some(packet)` when it should be
    /// handed to the spontaneous-event subscriber instead of any pending
    /// action.
    pub fn dispatch(&self, packet: Packet) -> Option<Packet> {
        let mut inner = self.inner.lock().unwrap();

        let target = match packet.action_id() {
            Some(action_id) => {
                if inner.pending.contains_key(action_id) {
                    // Stay in the current-slot fallback until the action
                    // actually completes: a list/queue-status action's ack
                    // echoes ActionID, but its item and terminator events
                    // often don't, so they still need the fallback below.
                    Some(action_id.to_owned())
                } else if packet.is_event() {
                    return Some(packet);
                } else {
                    tracing::debug!(action_id, "dropping packet for unknown ActionID");
                    return None;
                }
            }
            None => {
                if packet.response().is_some() {
                    inner.current.front().cloned()
                } else if packet.is_event() {
                    let event_name = packet.event().expect("is_event implies Event header");
                    match inner.current.front() {
                        Some(t) => {
                            let interested = inner
                                .pending
                                .get(t)
                                .is_some_and(|p| p.state.interested_in_event(event_name));
                            if interested {
                                Some(t.clone())
                            } else {
                                return Some(packet);
                            }
                        }
                        None => return Some(packet),
                    }
                } else {
                    None
                }
            }
        };

        let Some(token) = target else {
            return None;
        };

        let outcome = match inner.pending.get_mut(&token) {
            Some(pending) => pending.state.feed(&packet),
            None => return None,
        };

        if let ShapeOutcome::Done(result) = outcome {
            inner.current.retain(|c| c != &token);
            let pending = inner
                .pending
                .remove(&token)
                .expect("token was just looked up");
            drop(inner); // never invoke a sink while holding the lock
            complete(pending, result);
        }
        None
    }

    /// Cancel a pending action. Any future packets for its token are
    /// dropped; the request itself is not retracted (AMI has no cancel
    /// message).
    pub fn cancel(&self, token: &str) {
        let pending = {
            let mut inner = self.inner.lock().unwrap();
            inner.current.retain(|c| c != token);
            inner.pending.remove(token)
        };
        if let Some(pending) = pending {
            complete(pending, Err(AmiError::Cancelled));
        }
    }

    /// Fail every pending action with the error the caller supplies
    /// (typically `AmiError::Disconnected`). After this call returns, no
    /// pending action remains.
    pub fn fail_all(&self, make_error: impl Fn() -> AmiError) {
        let pendings: Vec<PendingAction> = {
            let mut inner = self.inner.lock().unwrap();
            inner.current.clear();
            inner.pending.drain().map(|(_, p)| p).collect()
        };
        for pending in pendings {
            complete(pending, Err(make_error()));
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

fn complete(pending: PendingAction, result: Result<AmiValue, AmiError>) {
    match pending.sink {
        CompletionSink::Oneshot(tx) => {
            let _ = tx.send(result);
        }
        CompletionSink::Callback(f) => f(CallResult {
            correlation_token: pending.token,
            outcome: result,
        }),
    }
}
