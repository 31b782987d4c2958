//! Realignment of audio after an unpause.
//!
//! When a paused stream resumes, servers resend some audio that was already delivered before the
//! pause.  The first packets after the unpause are compared against the last audio delivered
//! before it, and whatever prefix repeats that data is cut off.  When no overlap shows up within
//! a few packets the attempt is abandoned and the held packets are released unchanged.

use bytes::Bytes;
use tracing::debug;

/// Number of bytes that have to line up before two payloads are considered to overlap
pub const FINGERPRINT_LENGTH: usize = 10;

/// Packets examined (and held) before giving up on finding the overlap
pub const MAX_RESYNC_ATTEMPTS: usize = 8;

/// What to do with an audio payload offered to the resync logic
#[derive(Debug, PartialEq)]
pub enum ResyncOutcome {
    /// Deliver these bytes.  After a successful match this is the novel suffix of the packet.
    Deliver(Bytes),

    /// The whole packet repeats data that was already delivered
    Drop,

    /// The packet is being held while the overlap is searched for
    Held,

    /// Resync was abandoned, deliver every held packet in order
    Replay(Vec<Bytes>),
}

#[derive(Default)]
pub struct AudioResync {
    last_delivered: Option<Bytes>,
    active: bool,
    attempts: usize,
    held: Vec<Bytes>,
}

impl AudioResync {
    pub fn new() -> AudioResync {
        AudioResync::default()
    }

    /// Remembers the most recent payload passed on to the consumer
    pub fn record_delivered(&mut self, payload: &Bytes) {
        if !self.active && !payload.is_empty() {
            self.last_delivered = Some(payload.clone());
        }
    }

    /// Starts looking for the overlap.  Does nothing if no audio was delivered before.
    pub fn begin(&mut self) {
        self.active = self.last_delivered.is_some();
        self.attempts = 0;
        self.held.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Forgets everything, including the reference payload
    pub fn reset(&mut self) {
        self.active = false;
        self.attempts = 0;
        self.held.clear();
        self.last_delivered = None;
    }

    /// Stops searching and hands back whatever was held
    pub fn abandon(&mut self) -> Vec<Bytes> {
        self.active = false;
        self.attempts = 0;
        self.held.drain(..).collect()
    }

    pub fn process(&mut self, payload: Bytes) -> ResyncOutcome {
        if !self.active {
            return ResyncOutcome::Deliver(payload);
        }

        let reference = match self.last_delivered {
            Some(ref reference) => reference.clone(),
            None => {
                self.active = false;
                return ResyncOutcome::Deliver(payload);
            }
        };

        self.attempts += 1;
        match duplicate_prefix_length(&reference[..], &payload[..]) {
            Some(length) if length >= payload.len() => {
                debug!(attempt = self.attempts, "Dropping fully repeated audio packet");
                if self.attempts >= MAX_RESYNC_ATTEMPTS {
                    return ResyncOutcome::Replay(self.abandon());
                }

                ResyncOutcome::Drop
            }

            Some(length) => {
                debug!(
                    attempt = self.attempts,
                    skipped = length,
                    "Audio realigned after unpause"
                );

                // Anything held before the match precedes the repeated data
                self.held.clear();
                self.active = false;
                self.attempts = 0;
                ResyncOutcome::Deliver(payload.slice(length..))
            }

            None => {
                self.held.push(payload);
                if self.attempts >= MAX_RESYNC_ATTEMPTS {
                    debug!(
                        held = self.held.len(),
                        "No audio overlap found after unpause, replaying held packets"
                    );

                    return ResyncOutcome::Replay(self.abandon());
                }

                ResyncOutcome::Held
            }
        }
    }
}

/// Finds how many leading bytes of `payload` repeat data from the end of `reference`.
///
/// First looks for the tail of `reference` inside `payload`.  If that doesn't show up, the
/// payload may sit entirely inside the reference, so the payload's head is looked for in the
/// reference instead.
pub fn duplicate_prefix_length(reference: &[u8], payload: &[u8]) -> Option<usize> {
    if reference.len() < FINGERPRINT_LENGTH || payload.len() < FINGERPRINT_LENGTH {
        return None;
    }

    let tail = &reference[reference.len() - FINGERPRINT_LENGTH..];
    for start in 0..=payload.len() - FINGERPRINT_LENGTH {
        if &payload[start..start + FINGERPRINT_LENGTH] != tail {
            continue;
        }

        // Everything before the match must repeat the reference too
        let end = start + FINGERPRINT_LENGTH;
        if end <= reference.len() && payload[..end] == reference[reference.len() - end..] {
            return Some(end);
        }
    }

    let head = &payload[..FINGERPRINT_LENGTH];
    for start in 0..=reference.len() - FINGERPRINT_LENGTH {
        if &reference[start..start + FINGERPRINT_LENGTH] != head {
            continue;
        }

        let repeated = reference.len() - start;
        if repeated >= payload.len() && reference[start..start + payload.len()] == payload[..] {
            return Some(payload.len());
        }
    }

    None
}
