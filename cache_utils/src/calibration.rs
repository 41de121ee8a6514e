use crate::histograms::StaticHistogram;
use crate::{flush, maccess, rdtsc_fence};
use itertools::Itertools;

/// Cycles taken by one read of `*p`.
///
/// The read sits between two fenced timestamps, so the second one cannot be taken
/// before the load completes. Counter wraparound within one measurement is not handled.
pub unsafe fn only_reload(p: *const u8) -> u64 {
    let t = unsafe { rdtsc_fence() };
    unsafe { maccess(p) };
    unsafe { rdtsc_fence() }.wrapping_sub(t)
}

pub unsafe fn flush_and_reload(p: *const u8) -> u64 {
    unsafe {
        flush(p);
        only_reload(p)
    }
}

pub unsafe fn load_and_reload(p: *const u8) -> u64 {
    unsafe {
        maccess(p);
        only_reload(p)
    }
}

pub const BUCKET_SIZE: u64 = 5;
pub const BUCKET_NUMBER: usize = 250;

pub type AccessHistogram = StaticHistogram<BUCKET_SIZE, BUCKET_NUMBER>;

/// Accesses strictly faster than `value` cycles are hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub value: u64,
}

impl Threshold {
    pub fn is_hit(&self, time: u64) -> bool {
        time < self.value
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub hit: AccessHistogram,
    pub miss: AccessHistogram,
    pub threshold: Threshold,
    pub error_rate: f32,
}

impl CalibrationResult {
    pub fn hit_median(&self) -> Option<u64> {
        self.hit.median_bucket().map(AccessHistogram::bucket_start)
    }

    pub fn miss_median(&self) -> Option<u64> {
        self.miss.median_bucket().map(AccessHistogram::bucket_start)
    }
}

/// Picks the hit/miss threshold with the fewest misclassified samples.
///
/// Among equally good thresholds the middle one is kept.
pub fn threshold_from_histograms(hit: &AccessHistogram, miss: &AccessHistogram) -> (Threshold, f32) {
    let hit_cum_sum = hit.cum_sum();
    let miss_cum_sum = miss.cum_sum();
    let hit_total = hit_cum_sum[BUCKET_NUMBER - 1];
    let miss_total = miss_cum_sum[BUCKET_NUMBER - 1];

    // Threshold i: buckets 0..=i are hits, the rest misses.
    let errors = (0..BUCKET_NUMBER - 1)
        .map(|i| miss_cum_sum[i] + (hit_total - hit_cum_sum[i]))
        .collect_vec();
    let min_error = errors.iter().copied().min().unwrap_or(0);
    let candidates = errors.iter().positions(|&e| e == min_error).collect_vec();
    let index = candidates[(candidates.len() - 1) / 2];

    let total = hit_total + miss_total;
    let error_rate = if total == 0 {
        0.0
    } else {
        min_error as f32 / total as f32
    };
    (
        Threshold {
            value: AccessHistogram::bucket_start(index + 1),
        },
        error_rate,
    )
}

/// Builds hit and miss latency histograms for the line holding `p`.
pub unsafe fn calibrate_access(p: *const u8, iterations: u32) -> CalibrationResult {
    let mut hit = AccessHistogram::empty();
    let mut miss = AccessHistogram::empty();

    unsafe { maccess(p) };
    for _ in 0..iterations {
        hit.record(unsafe { load_and_reload(p) });
    }
    for _ in 0..iterations {
        miss.record(unsafe { flush_and_reload(p) });
    }

    let (threshold, error_rate) = threshold_from_histograms(&hit, &miss);
    log::debug!(
        "calibration on {:p}: threshold {} cycles, error rate {:.4}",
        p,
        threshold.value,
        error_rate
    );
    CalibrationResult {
        hit,
        miss,
        threshold,
        error_rate,
    }
}
