use crate::region::SlotRegion;
use cache_side_channel::{ByteOracle, CacheStatus, ChannelFatalError, VictimTrigger, SLOT_COUNT};
use cache_utils::calibration::{only_reload, Threshold};
use cache_utils::mfence;
use static_assertions::const_assert;

/// Slot probed at step `j`.
///
/// 167 is odd, so `j -> 167 * j + 13 (mod 256)` is a bijection. Consecutive probes
/// land 167 slots apart, which keeps the stride prefetcher from learning the pattern.
pub const fn probe_order(j: usize) -> u8 {
    ((j * 167 + 13) & 0xff) as u8
}

pub const PROBE_ORDER: [u8; SLOT_COUNT] = {
    let mut order = [0u8; SLOT_COUNT];
    let mut j = 0;
    while j < SLOT_COUNT {
        order[j] = probe_order(j);
        j += 1;
    }
    order
};

const fn is_permutation(order: &[u8; SLOT_COUNT]) -> bool {
    let mut seen = [false; SLOT_COUNT];
    let mut j = 0;
    while j < SLOT_COUNT {
        if seen[order[j] as usize] {
            return false;
        }
        seen[order[j] as usize] = true;
        j += 1;
    }
    true
}

const_assert!(is_permutation(&PROBE_ORDER));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub slot: u8,
    pub cycles: u64,
}

/// Evicts all 256 slots.
pub fn flush_all(region: &SlotRegion) {
    for slot in 0..=255u8 {
        region.evict(slot);
    }
    mfence();
}

/// Times one reload of every slot, in `PROBE_ORDER`.
pub fn probe_all(region: &SlotRegion) -> [LatencySample; SLOT_COUNT] {
    let mut samples = [LatencySample { slot: 0, cycles: 0 }; SLOT_COUNT];
    for (sample, &slot) in samples.iter_mut().zip(PROBE_ORDER.iter()) {
        let cycles = unsafe { only_reload(region.slot_ptr(slot)) };
        *sample = LatencySample { slot, cycles };
    }
    samples
}

/// Slot of the fastest sample; the earliest one wins ties.
pub fn select_min(samples: &[LatencySample]) -> u8 {
    samples
        .iter()
        .min_by_key(|s| s.cycles)
        .map(|s| s.slot)
        .unwrap_or(0)
}

pub fn classify(threshold: &Threshold, cycles: u64) -> CacheStatus {
    if threshold.is_hit(cycles) {
        CacheStatus::Hit
    } else {
        CacheStatus::Miss
    }
}

/// Flushes every slot and counts those that still reload as hits.
pub fn hot_after_flush(region: &SlotRegion, threshold: &Threshold) -> usize {
    flush_all(region);
    probe_all(region)
        .iter()
        .filter(|s| classify(threshold, s.cycles) == CacheStatus::Hit)
        .count()
}

/// Flush+Reload oracle ranking slots by raw latency, without a calibrated threshold.
#[derive(Debug)]
pub struct NaiveFlushAndReload<'a> {
    region: &'a SlotRegion,
}

impl<'a> NaiveFlushAndReload<'a> {
    pub fn new(region: &'a SlotRegion) -> Self {
        NaiveFlushAndReload { region }
    }
}

impl ByteOracle for NaiveFlushAndReload<'_> {
    fn run_trial(
        &mut self,
        victim: &mut dyn VictimTrigger,
        position: usize,
    ) -> Result<u8, ChannelFatalError> {
        flush_all(self.region);
        victim.trigger(position)?;
        let samples = probe_all(self.region);
        // Logged after probing, printing between reloads would pollute the cache.
        if log::log_enabled!(log::Level::Trace) {
            for s in samples.iter() {
                log::trace!("position {} slot {:3}: {} cycles", position, s.slot, s.cycles);
            }
        }
        Ok(select_min(&samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_order_starts_like_the_lcg() {
        assert_eq!(PROBE_ORDER[0], 13);
        assert_eq!(PROBE_ORDER[1], 180);
        assert_eq!(PROBE_ORDER[2], (2 * 167 + 13) as u8);
        let mut sorted = PROBE_ORDER;
        sorted.sort_unstable();
        assert!(sorted.iter().enumerate().all(|(i, &s)| i == s as usize));
    }

    #[test]
    fn probe_order_is_not_linear() {
        assert!(PROBE_ORDER.iter().enumerate().all(|(j, &s)| j != s as usize));
        assert!(PROBE_ORDER
            .windows(2)
            .all(|w| (w[1] as i32 - w[0] as i32).abs() != 1));
    }

    #[test]
    fn select_min_breaks_ties_in_probe_order() {
        let samples = [
            LatencySample { slot: 9, cycles: 300 },
            LatencySample { slot: 4, cycles: 80 },
            LatencySample { slot: 2, cycles: 80 },
            LatencySample { slot: 1, cycles: 250 },
        ];
        assert_eq!(select_min(&samples), 4);
        assert_eq!(select_min(&[]), 0);
    }

    #[test]
    fn classify_against_threshold() {
        let threshold = Threshold { value: 145 };
        assert_eq!(classify(&threshold, 40), CacheStatus::Hit);
        assert_eq!(classify(&threshold, 144), CacheStatus::Hit);
        assert_eq!(classify(&threshold, 145), CacheStatus::Miss);
        assert_eq!(classify(&threshold, 300), CacheStatus::Miss);
    }
}
