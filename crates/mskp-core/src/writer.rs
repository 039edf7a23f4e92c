use crate::error::{MskpError, Result};
use crate::{PageRecord, RawHeader, RawPageV1, RawPageV2, Version, MSKP_MAGIC};
use std::io::{self, Read, Write};
use tracing::debug;
use zerocopy::byteorder::{F32, U32, U64};
use zerocopy::AsBytes;

/// Assembles a container from page sizes and an already encoded document.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    version: Version,
    pages: Vec<PageRecord>,
}

impl ContainerBuilder {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            pages: Vec::new(),
        }
    }

    pub fn page(self, size_x: f32, size_y: f32) -> Self {
        self.push(None, size_x, size_y)
    }

    /// Adds a page with an explicit offset. Version 2 containers drop it.
    pub fn page_at(self, offset: u64, size_x: f32, size_y: f32) -> Self {
        self.push(Some(offset), size_x, size_y)
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    fn push(mut self, offset: Option<u64>, size_x: f32, size_y: f32) -> Self {
        // Indices past u32::MAX saturate; write_to rejects such builders.
        let index = u32::try_from(self.pages.len()).unwrap_or(u32::MAX);
        self.pages.push(PageRecord {
            index,
            offset,
            size_x,
            size_y,
        });
        self
    }

    /// Writes magic, header and page table, then streams `document` after
    /// them. Returns the total number of bytes written.
    pub fn write_to<W: Write + ?Sized, D: Read>(&self, out: &mut W, mut document: D) -> Result<u64> {
        let page_count = page_count(self.pages.len())?;
        out.write_all(&MSKP_MAGIC)?;

        let header = RawHeader {
            version: U32::new(self.version.as_u32()),
            page_count: U32::new(page_count),
        };
        out.write_all(header.as_bytes())?;

        for page in &self.pages {
            match self.version {
                Version::V1 => {
                    let raw = RawPageV1 {
                        offset: U64::new(page.offset.unwrap_or(0)),
                        size_x: F32::new(page.size_x),
                        size_y: F32::new(page.size_y),
                    };
                    out.write_all(raw.as_bytes())?;
                }
                Version::V2 => {
                    let raw = RawPageV2 {
                        size_x: F32::new(page.size_x),
                        size_y: F32::new(page.size_y),
                    };
                    out.write_all(raw.as_bytes())?;
                }
            }
        }

        let table_len = self.pages.len() as u64 * self.version.record_size() as u64;
        let document_len = io::copy(&mut document, out)?;
        out.flush()?;

        debug!(
            version = %self.version,
            pages = self.pages.len(),
            document_len,
            "Wrote container"
        );
        Ok(MSKP_MAGIC.len() as u64 + 8 + table_len + document_len)
    }
}

/// Header page count for a table of `pages` records.
fn page_count(pages: usize) -> Result<u32> {
    u32::try_from(pages).map_err(|_| MskpError::TooManyPages(pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_v2_layout() {
        let mut out = Vec::new();
        let written = ContainerBuilder::new(Version::V2)
            .page(100.0, 200.0)
            .write_to(&mut out, &b"PICDATA"[..])
            .unwrap();

        let mut expected = MSKP_MAGIC.to_vec();
        expected.extend_from_slice(&[2, 0, 0, 0, 1, 0, 0, 0]);
        expected.extend_from_slice(&100.0f32.to_le_bytes());
        expected.extend_from_slice(&200.0f32.to_le_bytes());
        expected.extend_from_slice(b"PICDATA");

        assert_eq!(out, expected);
        assert_eq!(written, expected.len() as u64);
    }

    #[test]
    fn v1_pages_default_to_zero_offset() {
        let mut out = Vec::new();
        ContainerBuilder::new(Version::V1)
            .page(1.0, 2.0)
            .page_at(0x10, 3.0, 4.0)
            .write_to(&mut out, io::empty())
            .unwrap();

        let table = &out[32..];
        assert_eq!(table.len(), 32);
        assert_eq!(&table[..8], &0u64.to_le_bytes());
        assert_eq!(&table[16..24], &0x10u64.to_le_bytes());
    }

    #[test]
    fn v2_ignores_offsets() {
        let builder = ContainerBuilder::new(Version::V2).page_at(99, 5.0, 6.0);
        assert_eq!(builder.pages()[0].offset, Some(99));

        let mut out = Vec::new();
        builder.write_to(&mut out, io::empty()).unwrap();
        assert_eq!(out.len(), 24 + 8 + 8);
    }

    #[test]
    fn page_count_fits_header_field() {
        assert_eq!(page_count(0).unwrap(), 0);
        assert_eq!(page_count(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn page_count_above_header_field_is_rejected() {
        let pages = u32::MAX as usize + 1;
        assert!(matches!(
            page_count(pages),
            Err(MskpError::TooManyPages(n)) if n == pages
        ));
    }
}
