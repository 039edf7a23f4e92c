use mskp_core::{inspect, ContainerBuilder, Extent, MskpError, MskpReader, Stage, Version};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(bytes).unwrap();
    path
}

fn build(builder: &ContainerBuilder, document: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    builder.write_to(&mut bytes, document).unwrap();
    bytes
}

#[test]
fn v2_extraction_rewraps_to_original() {
    let dir = TempDir::new().unwrap();
    let document: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let builder = ContainerBuilder::new(Version::V2)
        .page(612.0, 792.0)
        .page(612.0, 792.0)
        .page(300.5, 0.25);
    let original = build(&builder, &document);
    let path = write_fixture(&dir, "doc.mskp", &original);

    let mut table = MskpReader::open(&path).unwrap().read_header().unwrap();
    let header = table.header();
    let pages: Vec<_> = table.by_ref().map(Result::unwrap).collect();
    let mut extracted = Vec::new();
    table.finish().unwrap().extract_to(&mut extracted).unwrap();
    assert_eq!(extracted, document);

    let rewrapped = pages
        .iter()
        .fold(ContainerBuilder::new(header.version), |b, p| b.page(p.size_x, p.size_y));
    assert_eq!(build(&rewrapped, &extracted), original);
}

#[test]
fn v1_extraction_length_is_offset_delta() {
    let dir = TempDir::new().unwrap();
    let builder = ContainerBuilder::new(Version::V1)
        .page_at(4096, 100.0, 100.0)
        .page_at(4096 + 37, 100.0, 100.0);
    let document = vec![0xAB; 200];
    let path = write_fixture(&dir, "legacy.mskp", &build(&builder, &document));

    let document_handle = MskpReader::open(&path)
        .unwrap()
        .read_header()
        .unwrap()
        .finish()
        .unwrap();
    assert_eq!(document_handle.extent(), Extent::Exact(37));

    let out_path = dir.path().join("first.skp");
    let mut out = File::create(&out_path).unwrap();
    assert_eq!(document_handle.extract_to(&mut out).unwrap(), 37);
    drop(out);
    assert_eq!(fs::read(out_path).unwrap(), vec![0xAB; 37]);
}

#[test]
fn inspect_collects_metadata() {
    let dir = TempDir::new().unwrap();
    let builder = ContainerBuilder::new(Version::V1)
        .page_at(0, 10.0, 20.0)
        .page_at(8, 30.0, 40.0);
    let path = write_fixture(&dir, "meta.mskp", &build(&builder, b"trailing"));

    let container = inspect(&path).unwrap();
    assert_eq!(container.header.version, Version::V1);
    assert_eq!(container.header.page_count, 2);
    assert_eq!(container.pages, builder.pages());
}

#[test]
fn inspect_fails_on_truncated_table() {
    let dir = TempDir::new().unwrap();
    let builder = ContainerBuilder::new(Version::V2).page(1.0, 1.0).page(2.0, 2.0);
    let mut bytes = build(&builder, b"");
    bytes.truncate(bytes.len() - 3);
    let path = write_fixture(&dir, "cut.mskp", &bytes);

    let err = inspect(&path).unwrap_err();
    assert!(matches!(
        err,
        MskpError::Truncated { stage: Stage::PageTable, .. }
    ));
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = inspect(dir.path().join("absent.mskp")).unwrap_err();
    assert!(matches!(err, MskpError::Io(_)));
}
