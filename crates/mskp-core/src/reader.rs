//! Sequential container reader.
//!
//! Each parsing stage is its own type, and moving to the next stage
//! consumes the previous one:
//!
//! ```ignore
//! let mut table = MskpReader::open("page.mskp")?.read_header()?;
//! for page in table.by_ref() {
//!     let page = page?;
//!     println!("{} x {}", page.size_x, page.size_y);
//! }
//! let written = table.finish()?.extract_to(&mut output)?;
//! ```

use crate::error::{MskpError, Result, Stage};
use crate::{ContainerHeader, PageRecord, RawHeader, RawPageV1, RawPageV2, Version, MSKP_MAGIC};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::iter::FusedIterator;
use std::path::Path;
use tracing::{debug, warn};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// A container whose magic has been verified.
pub struct MskpReader<R> {
    inner: R,
    position: u64,
}

impl MskpReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened container");
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> MskpReader<R> {
    /// Reads and checks the magic. Nothing past the magic is consumed.
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; MSKP_MAGIC.len()];
        let filled = read_up_to(&mut inner, &mut magic)?;

        if filled < magic.len() {
            // A clean prefix of the magic means the file was cut short.
            if magic[..filled] == MSKP_MAGIC[..filled] {
                return Err(MskpError::Truncated {
                    stage: Stage::Magic,
                    offset: filled as u64,
                    needed: magic.len() - filled,
                });
            }
            return Err(MskpError::BadMagic);
        }
        if magic != MSKP_MAGIC {
            return Err(MskpError::BadMagic);
        }

        Ok(Self {
            inner,
            position: magic.len() as u64,
        })
    }

    /// Reads `(version, page_count)`. An unknown version fails after
    /// exactly the header bytes have been consumed.
    pub fn read_header(mut self) -> Result<PageTable<R>> {
        let raw: RawHeader = self.read_struct(Stage::Header)?;
        let version = Version::try_from(raw.version.get())?;
        let header = ContainerHeader {
            version,
            page_count: raw.page_count.get(),
        };
        debug!(%version, page_count = header.page_count, "Read container header");

        Ok(PageTable {
            reader: self,
            header,
            next_index: 0,
            leading_offsets: Vec::with_capacity(2),
            failed: false,
        })
    }

    /// Bytes consumed from the underlying stream so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn read_struct<T: FromBytes + FromZeroes + AsBytes>(&mut self, stage: Stage) -> Result<T> {
        let mut value = T::new_zeroed();
        let buf = value.as_bytes_mut();
        let needed = buf.len();
        let filled = read_up_to(&mut self.inner, buf)?;

        if filled < needed {
            return Err(MskpError::Truncated {
                stage,
                offset: self.position + filled as u64,
                needed: needed - filled,
            });
        }
        self.position += needed as u64;
        Ok(value)
    }
}

/// Fills as much of `buf` as the stream allows, stopping only at EOF.
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// The page table: a single-pass iterator over the page records.
///
/// Records are decoded lazily. The first error ends the iteration.
pub struct PageTable<R> {
    reader: MskpReader<R>,
    header: ContainerHeader,
    next_index: u32,
    leading_offsets: Vec<u64>,
    failed: bool,
}

impl<R: Read> PageTable<R> {
    pub fn header(&self) -> ContainerHeader {
        self.header
    }

    /// Records not yet read.
    pub fn remaining(&self) -> u32 {
        if self.failed {
            0
        } else {
            self.header.page_count - self.next_index
        }
    }

    /// Reads whatever is left of the table and positions the stream on the
    /// trailing document.
    pub fn finish(mut self) -> Result<Document<R>> {
        while let Some(record) = self.next() {
            record?;
        }
        if self.failed {
            return Err(MskpError::PageTableAborted {
                read: self.next_index,
                expected: self.header.page_count,
            });
        }

        debug!(offset = self.reader.position, "Page table read");
        Ok(Document {
            reader: self.reader,
            version: self.header.version,
            leading_offsets: self.leading_offsets,
        })
    }

    fn read_page(&mut self) -> Result<PageRecord> {
        let index = self.next_index;
        let record = match self.header.version {
            Version::V1 => {
                let raw: RawPageV1 = self.reader.read_struct(Stage::PageTable)?;
                PageRecord {
                    index,
                    offset: Some(raw.offset.get()),
                    size_x: raw.size_x.get(),
                    size_y: raw.size_y.get(),
                }
            }
            Version::V2 => {
                let raw: RawPageV2 = self.reader.read_struct(Stage::PageTable)?;
                PageRecord {
                    index,
                    offset: None,
                    size_x: raw.size_x.get(),
                    size_y: raw.size_y.get(),
                }
            }
        };

        // Only the first two offsets matter for extraction.
        if let Some(offset) = record.offset {
            if self.leading_offsets.len() < 2 {
                self.leading_offsets.push(offset);
            }
        }
        Ok(record)
    }
}

impl<R: Read> Iterator for PageTable<R> {
    type Item = Result<PageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_index >= self.header.page_count {
            return None;
        }
        match self.read_page() {
            Ok(record) => {
                self.next_index += 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // The declared count is untrusted until the records are read.
        (0, Some(self.remaining() as usize))
    }
}

impl<R: Read> FusedIterator for PageTable<R> {}

/// Byte range `extract_to` will copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// Everything up to the end of the stream.
    Remainder,
    /// The first page of a version 1 container: `offsets[1] - offsets[0]`.
    Exact(u64),
}

/// The trailing document, positioned right after the page table.
pub struct Document<R> {
    reader: MskpReader<R>,
    version: Version,
    leading_offsets: Vec<u64>,
}

impl<R: Read> Document<R> {
    pub fn version(&self) -> Version {
        self.version
    }

    /// Stream offset where the trailing document begins.
    pub fn position(&self) -> u64 {
        self.reader.position
    }

    pub fn extent(&self) -> Extent {
        match (self.version, self.leading_offsets.as_slice()) {
            (Version::V1, [first, second, ..]) => match second.checked_sub(*first) {
                Some(len) => Extent::Exact(len),
                None => Extent::Remainder,
            },
            _ => Extent::Remainder,
        }
    }

    /// Copies the trailing document to `dest` and returns the bytes written.
    ///
    /// Version 1 offsets are not validated against the stream length: a
    /// stream that ends early yields a shorter copy.
    pub fn extract_to<W: Write + ?Sized>(mut self, dest: &mut W) -> Result<u64> {
        let extent = self.extent();
        let written = match extent {
            Extent::Remainder => {
                if let (Version::V1, [first, second, ..]) =
                    (self.version, self.leading_offsets.as_slice())
                {
                    warn!(first, second, "Page offsets are descending, copying the whole document");
                }
                io::copy(&mut self.reader.inner, dest)?
            }
            Extent::Exact(len) => {
                let written = io::copy(&mut (&mut self.reader.inner).take(len), dest)?;
                if written < len {
                    warn!(expected = len, written, "Document ended before the second page offset");
                }
                written
            }
        };
        self.reader.position += written;

        debug!(?extent, written, "Extracted trailing document");
        Ok(written)
    }

    /// Ends a metadata-only inspection without touching the trailing bytes.
    pub fn close(self) {
        debug!(offset = self.reader.position, "Closed container without extraction");
    }
}

/// Metadata gathered by [`inspect`].
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub header: ContainerHeader,
    pub pages: Vec<PageRecord>,
}

/// Reads the magic, header and whole page table of the container at `path`.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<Container> {
    let mut table = MskpReader::open(path)?.read_header()?;
    let header = table.header();
    let pages = table.by_ref().collect::<Result<Vec<_>>>()?;
    table.finish()?.close();
    Ok(Container { header, pages })
}
