//! Per-room connection supervision: the reconnect grace window.
//!
//! The room actor owns one [`ConnectionSupervisor`]. When an occupant's
//! connection drops the supervisor arms a deadline for that seat; a
//! reconnect disarms it. The actor's event loop waits on
//! [`GraceDeadline::elapsed`] alongside its command channel, the same way a
//! fixed-rate game loop waits on its next tick.

use std::future;
use std::time::Duration;

use digitduel_protocol::MAX_PLAYERS;
use tokio::time::{self, Instant};

/// The earliest armed grace deadline in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GraceDeadline {
    pub(crate) seat: usize,
    pub(crate) at: Instant,
}

impl GraceDeadline {
    /// Resolves with the seat index once the deadline passes.
    pub(crate) async fn elapsed(self) -> usize {
        time::sleep_until(self.at).await;
        self.seat
    }
}

/// Waits for `deadline`, or forever when nothing is armed.
pub(crate) async fn wait_for(deadline: Option<GraceDeadline>) -> usize {
    match deadline {
        Some(deadline) => deadline.elapsed().await,
        None => future::pending().await,
    }
}

/// Grace timers, one per seat.
#[derive(Debug)]
pub(crate) struct ConnectionSupervisor {
    grace: Duration,
    deadlines: [Option<Instant>; MAX_PLAYERS],
}

impl ConnectionSupervisor {
    pub(crate) fn new(grace: Duration) -> Self {
        Self {
            grace,
            deadlines: [None; MAX_PLAYERS],
        }
    }

    /// Arms the grace window for `seat`. Re-arming restarts it.
    pub(crate) fn connection_lost(&mut self, seat: usize) -> Instant {
        let at = Instant::now() + self.grace;
        self.deadlines[seat] = Some(at);
        at
    }

    /// Disarms `seat`. Returns whether a window was running.
    pub(crate) fn connection_restored(&mut self, seat: usize) -> bool {
        self.deadlines[seat].take().is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, seat: usize) -> bool {
        self.deadlines[seat].is_some()
    }

    /// Moves the guest's timer into the host seat after the host leaves.
    pub(crate) fn promote_guest(&mut self) {
        self.deadlines[0] = self.deadlines[1].take();
    }

    pub(crate) fn clear(&mut self) {
        self.deadlines = [None; MAX_PLAYERS];
    }

    pub(crate) fn next_deadline(&self) -> Option<GraceDeadline> {
        self.deadlines
            .iter()
            .enumerate()
            .filter_map(|(seat, at)| at.map(|at| GraceDeadline { seat, at }))
            .min_by_key(|deadline| deadline.at)
    }
}
