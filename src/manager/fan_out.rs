//! Fan-out/fan-in over a worker pool's work queue
//!
//! Shared by both nesting levels: the manager fans job runs out to the
//! job-run pool, and each job run fans its files out to the artifact pool.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::time::Duration;

use async_channel::Sender;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

/// Why a deadline-bounded send did not go through
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendError {
    #[error("deadline passed before the send completed")]
    DeadlineExceeded,

    #[error("receiver is gone")]
    Closed,
}

/// A deadline and the window it closes, both measured from one start instant
///
/// Timeout messages report `window`, never a re-measured remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deadline {
    pub at: Instant,
    pub window: Duration,
}

impl Deadline {
    /// `timeout` after `started`, cut short by the caller's deadline if earlier
    pub fn clipped(started: Instant, timeout: Duration, caller: Option<Instant>) -> Self {
        let window = caller.map_or(timeout, |caller| {
            caller.saturating_duration_since(started).min(timeout)
        });
        Self {
            at: started + window,
            window,
        }
    }
}

/// Send unless the deadline passes first
///
/// The deadline is checked first, so an expired send never lands even when
/// the queue has room.
pub(crate) async fn send_before<T>(tx: &Sender<T>, msg: T, deadline: Instant) -> Result<(), SendError> {
    if Instant::now() >= deadline {
        return Err(SendError::DeadlineExceeded);
    }
    tokio::select! {
        biased;
        _ = sleep_until(deadline) => Err(SendError::DeadlineExceeded),
        result = tx.send(msg) => result.map_err(|_| SendError::Closed),
    }
}

/// Replies gathered by one fan-out
#[derive(Debug)]
pub(crate) struct FanIn<K, Rep> {
    /// In arrival order
    pub replies: Vec<Rep>,
    /// Keys that never answered, ascending
    pub missing: Vec<K>,
}

/// Dispatch one request per key and collect replies until the deadline
///
/// The collector task is running before the first request is sent. Each
/// key is answered at most once: a duplicate or unknown reply is dropped.
/// Dispatch stops at the deadline; undispatched keys come back as missing.
pub(crate) async fn fan_out<K, Req, Rep, F>(
    keys: BTreeSet<K>,
    deadline: Instant,
    work_tx: &Sender<Req>,
    key_of: fn(&Rep) -> K,
    mut make_request: F,
) -> FanIn<K, Rep>
where
    K: Ord + Clone + Debug + Send + 'static,
    Rep: Send + 'static,
    F: FnMut(&K, Sender<Rep>) -> Req,
{
    if keys.is_empty() {
        return FanIn {
            replies: Vec::new(),
            missing: Vec::new(),
        };
    }

    // bounded(1): a worker only blocks on reply while the collector lags
    let (reply_tx, reply_rx) = async_channel::bounded::<Rep>(1);
    let (ready_tx, ready_rx) = oneshot::channel::<()>();

    let mut outstanding = keys.clone();
    let collector = tokio::spawn(async move {
        let _ = ready_tx.send(());
        let mut replies = Vec::with_capacity(outstanding.len());
        while !outstanding.is_empty() {
            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    debug!(outstanding = outstanding.len(), "fan-in deadline reached");
                    break;
                }
                msg = reply_rx.recv() => match msg {
                    Ok(reply) => {
                        if outstanding.remove(&key_of(&reply)) {
                            replies.push(reply);
                        }
                    }
                    // every sender dropped; nothing else can arrive
                    Err(_) => break,
                }
            }
        }
        (replies, outstanding)
    });

    if ready_rx.await.is_err() {
        warn!("fan-in collector exited before signalling readiness");
    }

    for key in &keys {
        let request = make_request(key, reply_tx.clone());
        if let Err(e) = send_before(work_tx, request, deadline).await {
            warn!(key = ?key, error = %e, "stopped dispatching");
            break;
        }
    }
    drop(reply_tx);

    match collector.await {
        Ok((replies, outstanding)) => FanIn {
            replies,
            missing: outstanding.into_iter().collect(),
        },
        Err(e) => {
            error!(error = %e, "fan-in collector task failed");
            FanIn {
                replies: Vec::new(),
                missing: keys.into_iter().collect(),
            }
        }
    }
}
