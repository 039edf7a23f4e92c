use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mskp_core::{inspect, ContainerBuilder, MskpError, MskpReader, PageRecord, Version};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const EXIT_USAGE: u8 = 1;
const EXIT_BAD_MAGIC: u8 = 2;
const EXIT_UNSUPPORTED_VERSION: u8 = 3;
const EXIT_FAILURE: u8 = 4;

#[derive(Parser, Debug)]
#[command(
    name = "mskp",
    version,
    about = "Inspect and extract Skia Multi-Picture Documents",
    args_conflicts_with_subcommands = true
)]
struct Args {
    /// Container to read; every page is reported on stdout
    input: Option<PathBuf>,
    /// Write the embedded document to this file
    output: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a container header and page table
    Inspect {
        container: PathBuf,
    },
    /// Check every .mskp file below a directory
    Scan {
        dir: PathBuf,
    },
    /// Wrap an encoded document into a version 2 container
    Pack {
        #[arg(short, long)]
        document: PathBuf,
        /// Page size as WIDTHxHEIGHT, once per page
        #[arg(short, long = "page", value_parser = parse_page_size, required = true)]
        pages: Vec<(f32, f32)>,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    init_tracing();
    ExitCode::from(run(std::env::args_os()))
}

/// Parses `args` and runs the selected command, returning the exit code.
fn run<I, T>(args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Help and version requests are not errors.
            return if e.use_stderr() { EXIT_USAGE } else { 0 };
        }
    };

    let result = match args.cmd {
        Some(Commands::Inspect { container }) => inspect_container(&container, &mut io::stdout().lock()),
        Some(Commands::Scan { dir }) => scan_dir(&dir),
        Some(Commands::Pack { document, pages, output }) => pack(&document, &pages, &output),
        None => match args.input {
            Some(input) => dump(&input, args.output.as_deref()),
            None => {
                let _ = Args::command()
                    .error(ErrorKind::MissingRequiredArgument, "a container path is required")
                    .print();
                return EXIT_USAGE;
            }
        },
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code(&err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MSKP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MskpError>() {
        Some(MskpError::BadMagic) => EXIT_BAD_MAGIC,
        Some(MskpError::UnsupportedVersion(_)) => EXIT_UNSUPPORTED_VERSION,
        _ => EXIT_FAILURE,
    }
}

fn format_page(page: &PageRecord) -> String {
    match page.offset {
        Some(offset) => format!(
            "page {}  offset={}  size=({:?},{:?})",
            page.index, offset, page.size_x, page.size_y
        ),
        None => format!("page {}  size=({:?},{:?})", page.index, page.size_x, page.size_y),
    }
}

fn parse_page_size(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let x: f32 = x.trim().parse().map_err(|e| format!("bad width '{}': {}", x, e))?;
    let y: f32 = y.trim().parse().map_err(|e| format!("bad height '{}': {}", y, e))?;
    Ok((x, y))
}

fn dump(input: &Path, output: Option<&Path>) -> Result<()> {
    let stdout = io::stdout();
    let mut report = stdout.lock();
    dump_to(input, output, &mut report)
}

fn dump_to<W: Write>(input: &Path, output: Option<&Path>, report: &mut W) -> Result<()> {
    let mut table = MskpReader::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .read_header()?;

    // The whole table is parsed before anything is reported or created.
    let pages = table.by_ref().collect::<mskp_core::Result<Vec<_>>>()?;
    let document = table.finish()?;

    for page in &pages {
        writeln!(report, "{}", format_page(page))?;
    }

    match output {
        Some(path) => {
            let file = File::create(path).context("Failed to create output file")?;
            let mut out = BufWriter::new(file);
            let written = document.extract_to(&mut out)?;
            out.flush()?;
            info!(path = %path.display(), written, "Extracted document");
        }
        None => document.close(),
    }
    Ok(())
}

fn inspect_container<W: Write>(container: &Path, report: &mut W) -> Result<()> {
    let container = inspect(container)
        .with_context(|| format!("Failed to inspect {}", container.display()))?;
    writeln!(report, "Status: VALID MSKP Container")?;
    writeln!(report, "Version: {}", container.header.version)?;
    writeln!(report, "Pages: {}", container.header.page_count)?;
    Ok(())
}

fn scan_dir(dir: &Path) -> Result<()> {
    let mut containers = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_mskp = entry.path().extension().map_or(false, |ext| ext.eq_ignore_ascii_case("mskp"));
        if entry.file_type().is_file() && is_mskp {
            containers.push(entry.into_path());
        }
    }

    let bar = ProgressBar::new(containers.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let mut rows = Vec::with_capacity(containers.len());
    for path in containers {
        let relative = path.strip_prefix(dir).unwrap_or(path.as_path()).to_string_lossy().replace('\\', "/");
        rows.push(scan_row(relative, &path));
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!("{:<50} | {:<7} | {:<6} | {}", "PATH", "VERSION", "PAGES", "STATUS");
    println!("{:-<50}-|-{:-<7}-|-{:-<6}-|-{:-<10}", "", "", "", "");
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}

fn scan_row(relative: String, path: &Path) -> String {
    match inspect(path) {
        Ok(container) => format!(
            "{:<50} | {:<7} | {:<6} | OK",
            relative, container.header.version, container.header.page_count
        ),
        Err(e) => format!("{:<50} | {:<7} | {:<6} | {}", relative, "-", "-", e),
    }
}

fn pack(document: &Path, pages: &[(f32, f32)], output: &Path) -> Result<()> {
    let builder = pages
        .iter()
        .fold(ContainerBuilder::new(Version::V2), |b, &(x, y)| b.page(x, y));

    let source = File::open(document)
        .with_context(|| format!("Failed to open document {}", document.display()))?;
    let file = File::create(output).context("Failed to create output file")?;
    let mut out = BufWriter::new(file);
    let written = builder.write_to(&mut out, source)?;

    println!("Packed {} pages into {} ({} bytes)", pages.len(), output.display(), written);
    Ok(())
}
