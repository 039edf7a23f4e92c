use zerocopy::byteorder::{LittleEndian, F32, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub mod error;
pub mod reader;
pub mod writer;

pub use error::{MskpError, Result, Stage};
pub use reader::{inspect, Container, Document, Extent, MskpReader, PageTable};
pub use writer::ContainerBuilder;

/// Magic bytes "Skia Multi-Picture Doc\n\n" that open every container.
pub const MSKP_MAGIC: [u8; 24] = *b"Skia Multi-Picture Doc\n\n";

type LE = LittleEndian;

/// On-disk header following the magic.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, AsBytes, FromZeroes)]
pub struct RawHeader {
    pub version: U32<LE>,
    pub page_count: U32<LE>,
}

/// Version 1 page record: absolute offset plus page size.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, AsBytes, FromZeroes)]
pub struct RawPageV1 {
    pub offset: U64<LE>,
    pub size_x: F32<LE>,
    pub size_y: F32<LE>,
}

/// Version 2 page record: page size only.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, AsBytes, FromZeroes)]
pub struct RawPageV2 {
    pub size_x: F32<LE>,
    pub size_y: F32<LE>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    pub fn as_u32(self) -> u32 {
        match self {
            Version::V1 => 1,
            Version::V2 => 2,
        }
    }

    /// Size in bytes of one page record for this version.
    pub fn record_size(self) -> usize {
        match self {
            Version::V1 => std::mem::size_of::<RawPageV1>(),
            Version::V2 => std::mem::size_of::<RawPageV2>(),
        }
    }
}

impl TryFrom<u32> for Version {
    type Error = MskpError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Version::V1),
            2 => Ok(Version::V2),
            other => Err(MskpError::UnsupportedVersion(other)),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.as_u32(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: Version,
    pub page_count: u32,
}

/// Decoded page metadata. `offset` is only present in version 1 containers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRecord {
    pub index: u32,
    pub offset: Option<u64>,
    pub size_x: f32,
    pub size_y: f32,
}
