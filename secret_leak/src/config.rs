use clap::{ArgAction, Parser};
use flush_reload::{SlotRegion, CACHE_LINE_SIZE, DEFAULT_STRIDE};
use std::path::PathBuf;
use thiserror::Error;

/// Largest position the two-digit trigger record can carry.
pub const MAX_POSITION: usize = 99;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one trial per byte is required")]
    NoTrials,
    #[error("nothing to leak, length is 0")]
    EmptyRange,
    #[error("last position {last} does not fit the two-digit trigger record (max {})", MAX_POSITION)]
    PositionTooLarge { last: usize },
    #[error("slot stride {stride} is smaller than a cache line ({} bytes)", CACHE_LINE_SIZE)]
    StrideTooSmall { stride: usize },
    #[error("256 slots of stride {stride} at offset {offset:#x} need {needed:#x} bytes, only {file_size:#x} are mapped")]
    RegionOutsideFile {
        offset: usize,
        stride: usize,
        needed: usize,
        file_size: usize,
    },
}

/// Accepts decimal or `0x`-prefixed hexadecimal.
pub fn parse_number(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    r.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

/// Leak the victim's secret, one byte per position, through a shared file mapping.
///
/// Positions are written to stdout for the victim; everything else goes to stderr.
#[derive(Debug, Clone, Parser)]
#[command(name = "secret_leak", version)]
pub struct LeakConfig {
    /// File mapped by both this process and the victim
    #[arg(long, default_value = "./chall")]
    pub file: PathBuf,

    /// Bytes of the file to map
    #[arg(long, default_value = "0x24ec8", value_parser = parse_number)]
    pub file_size: usize,

    /// Offset of the victim's probe array in the file
    #[arg(long, default_value = "0x2020", value_parser = parse_number)]
    pub offset: usize,

    /// Distance in bytes between two probe slots
    #[arg(long, default_value_t = DEFAULT_STRIDE, value_parser = parse_number)]
    pub stride: usize,

    /// First secret position to leak
    #[arg(long, default_value_t = 48, value_parser = parse_number)]
    pub start: usize,

    /// Number of secret bytes to leak
    #[arg(long, default_value_t = 28, value_parser = parse_number)]
    pub length: usize,

    /// Flush+Reload rounds voted over for each byte
    #[arg(long, default_value_t = 10)]
    pub trials: u32,

    /// Pin the process to this core while leaking
    #[arg(long)]
    pub core: Option<usize>,

    /// Measure hit and miss latencies on the region before leaking
    #[arg(long)]
    pub calibrate: bool,

    /// More logging (-v debug, -vv per-probe timings)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl LeakConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if self.length == 0 {
            return Err(ConfigError::EmptyRange);
        }
        let last = self.start.saturating_add(self.length - 1);
        if last > MAX_POSITION {
            return Err(ConfigError::PositionTooLarge { last });
        }
        if self.stride < CACHE_LINE_SIZE {
            return Err(ConfigError::StrideTooSmall {
                stride: self.stride,
            });
        }
        let needed = SlotRegion::required_len(self.offset, self.stride).unwrap_or(usize::MAX);
        if needed > self.file_size {
            return Err(ConfigError::RegionOutsideFile {
                offset: self.offset,
                stride: self.stride,
                needed,
                file_size: self.file_size,
            });
        }
        Ok(())
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
