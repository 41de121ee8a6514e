#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

pub mod cache_info;
pub mod calibration;
pub mod histograms;
pub mod mmap;

use core::arch::x86_64 as arch_x86;
use core::ptr;

// rdtsc (has mfence before and after)
pub unsafe fn rdtsc_fence() -> u64 {
    unsafe { arch_x86::_mm_mfence() };
    let tsc: u64 = unsafe { arch_x86::_rdtsc() };
    unsafe { arch_x86::_mm_mfence() };
    tsc
}

/// Single read of `*p` that the compiler may not elide.
pub unsafe fn maccess<T>(p: *const T) {
    unsafe { ptr::read_volatile(p) };
}

// flush (clflush)
pub unsafe fn flush(p: *const u8) {
    unsafe { arch_x86::_mm_clflush(p) };
}

pub fn mfence() {
    unsafe { arch_x86::_mm_mfence() };
}
