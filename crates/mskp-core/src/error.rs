use std::fmt;
use thiserror::Error;

/// Parsing stage at which a short read happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Magic,
    Header,
    PageTable,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Magic => "magic",
            Stage::Header => "header",
            Stage::PageTable => "page table",
        };
        f.pad(name)
    }
}

#[derive(Error, Debug)]
pub enum MskpError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid Container: Magic bytes mismatch")]
    BadMagic,
    #[error("Unsupported container version: {0} (expected 1 or 2)")]
    UnsupportedVersion(u32),
    #[error("Truncated container: short read in {stage} at offset {offset} ({needed} more bytes needed)")]
    Truncated { stage: Stage, offset: u64, needed: usize },
    #[error("Too many pages for one container: {0} (at most {max})", max = u32::MAX)]
    TooManyPages(usize),
    #[error("Page table abandoned after an error: {read} of {expected} records read")]
    PageTableAborted { read: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, MskpError>;
