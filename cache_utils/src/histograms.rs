use core::ops::Index;

/// Timing histogram, bucket `i` holds times in `[WIDTH * i, WIDTH * (i + 1) - 1]`.
///
/// Times past the last bucket are clamped into it.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticHistogram<const WIDTH: u64, const N: usize> {
    data: [u32; N],
}

impl<const WIDTH: u64, const N: usize> StaticHistogram<WIDTH, N> {
    pub fn empty() -> Self {
        Self { data: [0; N] }
    }

    pub fn bucket(time: u64) -> usize {
        core::cmp::min(N as u64 - 1, time / WIDTH) as usize
    }

    pub fn bucket_start(bucket: usize) -> u64 {
        bucket as u64 * WIDTH
    }

    pub fn record(&mut self, time: u64) {
        self.data[Self::bucket(time)] += 1;
    }

    pub fn total(&self) -> u32 {
        self.data.iter().sum()
    }

    /// `cum_sum()[i]` counts every sample in buckets `0..=i`.
    pub fn cum_sum(&self) -> [u32; N] {
        let mut res = [0; N];
        let mut acc = 0;
        for (r, &c) in res.iter_mut().zip(self.data.iter()) {
            acc += c;
            *r = acc;
        }
        res
    }

    /// First bucket reaching half of the samples, `None` when empty.
    pub fn median_bucket(&self) -> Option<usize> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        self.cum_sum().iter().position(|&c| 2 * c >= total)
    }
}

impl<const WIDTH: u64, const N: usize> Default for StaticHistogram<WIDTH, N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const WIDTH: u64, const N: usize> Index<usize> for StaticHistogram<WIDTH, N> {
    type Output = u32;

    fn index(&self, bucket: usize) -> &Self::Output {
        &self.data[bucket]
    }
}
