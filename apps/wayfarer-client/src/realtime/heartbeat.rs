//! STOMP heart-beat negotiation and incoming liveness tracking.

use std::time::Duration;

use tokio::time::Instant;

/// Silence tolerated on the incoming side, as a multiple of the negotiated
/// interval, before the connection is declared dead.
pub const INCOMING_TOLERANCE: u32 = 2;

/// Negotiated heart-beat intervals. `None` disables that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

impl Heartbeat {
    /// Combine what we offered (`client_outgoing`, `client_incoming`) with the
    /// server's `heart-beat` header (`sx,sy`: server sends every `sx`, wants to
    /// receive every `sy`). A zero on either side disables that direction;
    /// otherwise the slower of the two wins.
    pub fn negotiate(
        client_outgoing: Duration,
        client_incoming: Duration,
        server_header: Option<&str>,
    ) -> Self {
        let (server_outgoing, server_incoming) =
            server_header.and_then(parse_header).unwrap_or((0, 0));

        Self {
            outgoing: combine(client_outgoing, Duration::from_millis(server_incoming)),
            incoming: combine(client_incoming, Duration::from_millis(server_outgoing)),
        }
    }

    /// How long the broker may stay silent before we give up on it.
    pub fn incoming_deadline(&self) -> Option<Duration> {
        self.incoming.map(|d| d * INCOMING_TOLERANCE)
    }
}

fn combine(ours: Duration, theirs: Duration) -> Option<Duration> {
    if ours.is_zero() || theirs.is_zero() {
        None
    } else {
        Some(ours.max(theirs))
    }
}

/// Parse a `heart-beat` header value (`"<cx>,<cy>"`).
pub fn parse_header(value: &str) -> Option<(u64, u64)> {
    let (a, b) = value.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Tracks when the broker was last heard from.
#[derive(Debug)]
pub struct Liveness {
    last_seen: Instant,
    deadline: Option<Duration>,
}

impl Liveness {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            last_seen: Instant::now(),
            deadline,
        }
    }

    /// Any inbound traffic counts as proof of life.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => self.last_seen.elapsed() >= deadline,
            None => false,
        }
    }

    pub fn silence(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// When the broker will be considered dead if nothing else arrives.
    pub fn expires_at(&self) -> Option<Instant> {
        self.deadline.map(|d| self.last_seen + d)
    }
}
