//! web-preview - write a self-contained HTML reader for a diary book

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use diary_pager::{
    open_document, FsDocumentSource, FsImageResolver, LayoutConfig, OracleConfig, PagerConfig,
    Reader,
};
use diary_pager_web::build_preview;

const DEFAULT_OUT_PATH: &str = "target/web-preview/index.html";

/// Write an HTML reader document for a diary book or text file.
#[derive(Parser, Debug)]
#[command(name = "web-preview")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a text file. Omit when using --book
    #[arg(required_unless_present = "book")]
    file: Option<PathBuf>,

    /// Book id, loaded from <books-root>/<id>/book.txt
    #[arg(short = 'b', long)]
    book: Option<String>,

    /// Directory holding book folders
    #[arg(long = "books-root", default_value = "books")]
    books_root: PathBuf,

    /// JSON configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Measure rendered height instead of the character budget
    #[arg(long, action = ArgAction::SetTrue)]
    rendered: bool,

    /// Viewport width in pixels
    #[arg(short = 'W', long, default_value = "390")]
    width: u32,

    /// Viewport height in pixels
    #[arg(short = 'H', long, default_value = "844")]
    height: u32,

    /// Document title; defaults to the book id
    #[arg(long)]
    title: Option<String>,

    /// Output HTML path
    #[arg(short = 'o', long = "out", default_value = DEFAULT_OUT_PATH)]
    out: PathBuf,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let mut config = match &args.config {
        Some(path) => PagerConfig::load(path).map_err(|e| e.to_string())?,
        None => PagerConfig::default(),
    };
    config.oracle = if args.rendered {
        OracleConfig::Rendered(LayoutConfig::for_display(args.width, args.height))
    } else {
        config.oracle.for_viewport(args.width, args.height)
    };

    let mut reader = open_reader(args, &config)?;
    let title = args
        .title
        .clone()
        .unwrap_or_else(|| reader.id().to_string());
    let preview = build_preview(&mut reader, &title);

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
    }
    std::fs::write(&args.out, &preview.html).map_err(|e| e.to_string())?;

    println!(
        "wrote web preview to {} (pages={}, profile={})",
        args.out.display(),
        preview.payload.meta.page_count,
        preview.payload.meta.profile,
    );
    if let Some(err) = &preview.payload.meta.load_error {
        return Err(err.clone());
    }
    Ok(())
}

fn open_reader(args: &Args, config: &PagerConfig) -> Result<Reader, String> {
    if let Some(id) = &args.book {
        let source = FsDocumentSource::new(&args.books_root);
        let resolver = FsImageResolver::for_book(&args.books_root, id)
            .with_locations_relative_to(out_dir(&args.out));
        return open_document(&source, &resolver, id, config).map_err(|e| e.to_string());
    }
    let Some(path) = &args.file else {
        return Err("pass a text file or --book".to_string());
    };
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let resolver =
        FsImageResolver::new([base.join("images")]).with_locations_relative_to(out_dir(&args.out));
    Ok(Reader::from_text(id, &raw, &resolver, config))
}

fn out_dir(out: &Path) -> PathBuf {
    out.parent().map(Path::to_path_buf).unwrap_or_default()
}
