#![deny(unsafe_op_in_unsafe_fn)]

use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use std::fmt::Debug;
use std::io;
use thiserror::Error;

pub mod table_side_channel;

/// Number of candidate lines, one per byte value.
pub const SLOT_COUNT: usize = 256;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Errors that stop an attack before or while it runs.
///
/// Misidentified slots are not errors, the voting absorbs them.
#[derive(Debug, Error)]
pub enum ChannelFatalError {
    #[error("region of {available} bytes cannot hold 256 slots of stride {stride} at offset {offset} ({needed} bytes needed)")]
    RegionTooSmall {
        offset: usize,
        stride: usize,
        needed: usize,
        available: usize,
    },
    #[error("slot stride {stride} is smaller than a cache line ({line} bytes)")]
    StrideTooSmall { stride: usize, line: usize },
    #[error("{length} positions from {start} run past the largest position")]
    PositionOverflow { start: usize, length: usize },
    #[error("victim trigger failed: {0}")]
    Trigger(#[from] io::Error),
    #[error("cannot change cpu affinity: {0}")]
    Affinity(#[from] nix::Error),
}

/// Makes the victim read the slot indexed by its secret byte at `position`.
///
/// The access must have happened by the time `trigger` returns.
pub trait VictimTrigger {
    fn trigger(&mut self, position: usize) -> io::Result<()>;
}

impl<F: FnMut(usize)> VictimTrigger for F {
    fn trigger(&mut self, position: usize) -> io::Result<()> {
        self(position);
        Ok(())
    }
}

/// One flush, trigger, probe round, returning the slot that looked hot.
pub trait ByteOracle: Debug {
    fn run_trial(
        &mut self,
        victim: &mut dyn VictimTrigger,
        position: usize,
    ) -> Result<u8, ChannelFatalError>;
}

#[must_use = "This result must be used to restore affinity"]
pub fn set_affinity(cpu_set: &CpuSet) -> Result<CpuSet, nix::Error> {
    let old = sched_getaffinity(Pid::from_raw(0))?;
    sched_setaffinity(Pid::from_raw(0), cpu_set)?;
    Ok(old)
}

pub fn restore_affinity(cpu_set: &CpuSet) -> Result<(), nix::Error> {
    sched_setaffinity(Pid::from_raw(0), cpu_set)
}

/// Keeps the process on one core until dropped, then restores the previous mask.
#[derive(Debug)]
pub struct CorePin {
    core: usize,
    old: CpuSet,
}

impl CorePin {
    pub fn new(core: usize) -> Result<CorePin, ChannelFatalError> {
        let mut cpu_set = CpuSet::new();
        cpu_set.set(core)?;
        let old = set_affinity(&cpu_set)?;
        log::debug!("pinned to core {}", core);
        Ok(CorePin { core, old })
    }

    pub fn core(&self) -> usize {
        self.core
    }
}

impl Drop for CorePin {
    fn drop(&mut self) {
        if let Err(e) = restore_affinity(&self.old) {
            log::warn!("failed to restore affinity after core {}: {}", self.core, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_trigger_sees_positions() {
        let mut seen = Vec::new();
        {
            let mut victim = |p: usize| seen.push(p);
            victim.trigger(48).unwrap();
            victim.trigger(49).unwrap();
        }
        assert_eq!(seen, vec![48, 49]);
    }

    #[test]
    fn pin_to_current_core_and_restore() {
        let before = sched_getaffinity(Pid::from_raw(0)).unwrap();
        let core = (0..CpuSet::count())
            .find(|&i| before.is_set(i).unwrap_or(false))
            .unwrap();
        {
            let pin = CorePin::new(core).unwrap();
            assert_eq!(pin.core(), core);
            let during = sched_getaffinity(Pid::from_raw(0)).unwrap();
            assert!(during.is_set(core).unwrap());
        }
        let after = sched_getaffinity(Pid::from_raw(0)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn error_messages() {
        let e = ChannelFatalError::StrideTooSmall { stride: 32, line: 64 };
        assert_eq!(
            e.to_string(),
            "slot stride 32 is smaller than a cache line (64 bytes)"
        );
    }
}
