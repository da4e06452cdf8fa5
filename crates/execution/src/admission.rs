//! Admission control for tools that are not thread-safe.
//!
//! Each exclusive tool code has its own FIFO queue of tickets. A requester
//! holds the tool while its ticket is at the head of the queue. Queues for
//! different tool codes never interact.

use crate::config::AdmissionConfig;
use crate::error::AdmissionError;
use docflow_core::{RequestId, Ticket, ToolCode};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Answer to a turn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Every earlier ticket has been released
    Granted,
    /// Still waiting; 1-based position among pending tickets
    Waiting {
        /// Queue position (the current holder is position 1)
        position: usize,
    },
}

impl Turn {
    /// Whether the turn was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Turn::Granted)
    }

    /// Queue position; a granted ticket is at position 1.
    pub fn position(&self) -> usize {
        match self {
            Turn::Granted => 1,
            Turn::Waiting { position } => *position,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queues: HashMap<ToolCode, VecDeque<Ticket>>,
    notifiers: HashMap<ToolCode, Arc<Notify>>,
    next_arrival: u64,
}

/// Per-tool FIFO ticketing shared by every request in the process.
#[derive(Debug)]
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    config: AdmissionConfig,
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}

impl AdmissionQueue {
    /// Create an empty queue set.
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            config,
        }
    }

    /// Timing configuration.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    // No critical section can panic halfway through an update.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for `requester`'s turn on `tool`, enqueueing a ticket on first call.
    pub fn request_turn(&self, tool: &ToolCode, requester: RequestId) -> Turn {
        let mut state = self.lock();
        let QueueState {
            queues,
            next_arrival,
            ..
        } = &mut *state;
        let queue = queues.entry(tool.clone()).or_default();

        let index = match queue.iter().position(|t| t.requester == requester) {
            Some(index) => index,
            None => {
                let arrival = *next_arrival;
                *next_arrival += 1;
                queue.push_back(Ticket {
                    tool: tool.clone(),
                    requester,
                    arrival,
                });
                debug!(tool = %tool, %requester, arrival, "Ticket issued");
                queue.len() - 1
            }
        };

        if index == 0 {
            Turn::Granted
        } else {
            Turn::Waiting {
                position: index + 1,
            }
        }
    }

    /// Remove `requester`'s ticket for `tool` and wake waiters.
    ///
    /// Returns `true` if a ticket was removed.
    pub fn release_turn(&self, tool: &ToolCode, requester: RequestId) -> bool {
        let mut state = self.lock();

        let mut removed = false;
        let mut now_empty = false;
        if let Some(queue) = state.queues.get_mut(tool) {
            let before = queue.len();
            queue.retain(|t| t.requester != requester);
            removed = queue.len() != before;
            now_empty = queue.is_empty();
        }
        if now_empty {
            state.queues.remove(tool);
        }

        if removed {
            debug!(tool = %tool, %requester, "Ticket released");
            if let Some(notify) = state.notifiers.get(tool) {
                notify.notify_waiters();
            }
        }
        removed
    }

    /// Pending tickets for `tool`, holder first.
    pub fn pending(&self, tool: &ToolCode) -> Vec<Ticket> {
        self.lock()
            .queues
            .get(tool)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn notifier(&self, tool: &ToolCode) -> Arc<Notify> {
        Arc::clone(self.lock().notifiers.entry(tool.clone()).or_default())
    }

    /// Wait until `requester` holds `tool`.
    ///
    /// Re-checks the queue every poll interval, or sooner when a ticket is
    /// released. The deadline starts at the base timeout and tightens to
    /// `elapsed + position × allowance` whenever that is earlier. A wait that
    /// times out gives up its ticket.
    pub async fn acquire(
        &self,
        tool: &ToolCode,
        requester: RequestId,
    ) -> Result<AdmissionGuard<'_>, AdmissionError> {
        let notify = self.notifier(tool);
        let guard = AdmissionGuard {
            queue: self,
            tool: tool.clone(),
            requester,
            released: false,
        };

        let start = Instant::now();
        let mut deadline = self.config.base_timeout();

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let position = match self.request_turn(tool, requester) {
                Turn::Granted => {
                    info!(tool = %tool, %requester, waited = ?start.elapsed(), "Admission granted");
                    return Ok(guard);
                }
                Turn::Waiting { position } => position,
            };

            let elapsed = start.elapsed();
            deadline = self.tightened_deadline(deadline, elapsed, position);

            if elapsed > deadline {
                warn!(tool = %tool, %requester, ?elapsed, position, "Admission timed out");
                drop(guard);
                return Err(AdmissionError::AdmissionTimeout {
                    tool: tool.clone(),
                    requester,
                    elapsed,
                    position,
                });
            }

            debug!(tool = %tool, %requester, position, remaining = ?deadline.saturating_sub(elapsed), "Waiting for turn");

            let _ = tokio::time::timeout(self.config.poll_interval(), notified).await;
        }
    }

    /// Deadline of a wait at `position` after `elapsed`, given the deadline
    /// so far. Never later than `current`; `elapsed` and the result are
    /// measured from the start of the wait.
    pub fn tightened_deadline(
        &self,
        current: Duration,
        elapsed: Duration,
        position: usize,
    ) -> Duration {
        let factor = u32::try_from(position).unwrap_or(u32::MAX);
        let allowance = self.config.per_position_allowance().saturating_mul(factor);
        current.min(elapsed.saturating_add(allowance))
    }
}

/// Holds an exclusive tool; dropping it releases the ticket.
#[must_use = "dropping the guard releases the tool immediately"]
#[derive(Debug)]
pub struct AdmissionGuard<'a> {
    queue: &'a AdmissionQueue,
    tool: ToolCode,
    requester: RequestId,
    released: bool,
}

impl AdmissionGuard<'_> {
    /// Tool held by this guard.
    pub fn tool(&self) -> &ToolCode {
        &self.tool
    }

    /// Release the ticket now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.queue.release_turn(&self.tool, self.requester);
        }
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
