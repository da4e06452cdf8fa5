//! Admission tickets.

use crate::id::{RequestId, ToolCode};

/// A requester's arrival-ordered slot in a per-tool admission queue.
///
/// Lives only for the duration of one exclusive-tool acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Tool being waited for
    pub tool: ToolCode,

    /// Who holds the ticket
    pub requester: RequestId,

    /// Monotonic arrival order, unique per process
    pub arrival: u64,
}
