use cache_side_channel::{ChannelFatalError, SLOT_COUNT};
use cache_utils::calibration::{calibrate_access, CalibrationResult};
use cache_utils::mmap::MMappedMemory;
use cache_utils::{flush, maccess};
use static_assertions::const_assert;

pub const CACHE_LINE_SIZE: usize = 64;
/// Stride used by the victim's lookup array.
pub const DEFAULT_STRIDE: usize = 512;

const_assert!(DEFAULT_STRIDE >= CACHE_LINE_SIZE);

/// 256 probe slots laid out every `stride` bytes from `offset` in a read-only mapping.
///
/// Construction checks that every slot lies inside the mapping, which is what
/// makes the safe accessors below sound.
#[derive(Debug)]
pub struct SlotRegion {
    memory: MMappedMemory,
    offset: usize,
    stride: usize,
}

impl SlotRegion {
    pub fn new(
        memory: MMappedMemory,
        offset: usize,
        stride: usize,
    ) -> Result<SlotRegion, ChannelFatalError> {
        if stride < CACHE_LINE_SIZE {
            return Err(ChannelFatalError::StrideTooSmall {
                stride,
                line: CACHE_LINE_SIZE,
            });
        }
        let needed = Self::required_len(offset, stride).unwrap_or(usize::MAX);
        if needed > memory.len() {
            return Err(ChannelFatalError::RegionTooSmall {
                offset,
                stride,
                needed,
                available: memory.len(),
            });
        }
        log::debug!(
            "slot region at {:p}, stride {}",
            memory.as_ptr().wrapping_add(offset),
            stride
        );
        Ok(SlotRegion {
            memory,
            offset,
            stride,
        })
    }

    /// Bytes a mapping needs so that the first byte of slot 255 is inside it.
    pub fn required_len(offset: usize, stride: usize) -> Option<usize> {
        stride
            .checked_mul(SLOT_COUNT - 1)?
            .checked_add(offset)?
            .checked_add(1)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn slot_count(&self) -> usize {
        SLOT_COUNT
    }

    pub fn slot_ptr(&self, slot: u8) -> *const u8 {
        &self.memory[self.offset + slot as usize * self.stride] as *const u8
    }

    pub fn read_slot(&self, slot: u8) -> u8 {
        self.memory[self.offset + slot as usize * self.stride]
    }

    /// Brings the line of `slot` into the cache.
    pub fn touch(&self, slot: u8) {
        unsafe { maccess(self.slot_ptr(slot)) };
    }

    /// Evicts the line of `slot` from every cache level.
    pub fn evict(&self, slot: u8) {
        unsafe { flush(self.slot_ptr(slot)) };
    }

    pub fn calibrate(&self, slot: u8, iterations: u32) -> CalibrationResult {
        unsafe { calibrate_access(self.slot_ptr(slot), iterations) }
    }
}
