#![deny(unsafe_op_in_unsafe_fn)]

pub mod naive;
pub mod region;

pub use naive::{
    classify, flush_all, hot_after_flush, probe_all, select_min, LatencySample,
    NaiveFlushAndReload, PROBE_ORDER,
};
pub use region::{SlotRegion, CACHE_LINE_SIZE, DEFAULT_STRIDE};

use cache_side_channel::table_side_channel::{recover_secret, RecoveredSecret};
use cache_side_channel::{ChannelFatalError, VictimTrigger};

/// Leaks `length` secret bytes starting at `start` through `region`.
pub fn leak_secret(
    region: &SlotRegion,
    victim: &mut dyn VictimTrigger,
    start: usize,
    length: usize,
    trials: u32,
) -> Result<RecoveredSecret, ChannelFatalError> {
    let mut channel = NaiveFlushAndReload::new(region);
    recover_secret(&mut channel, victim, start, length, trials)
}
