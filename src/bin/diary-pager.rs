//! diary-pager - paginate a diary text into viewport-sized pages
//!
//! Reads a text file (or a book id under a books root), resolves its image
//! references and prints the resulting pages as plain text or JSON.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use diary_pager::{
    open_document, BudgetConfig, Cursor, FsDocumentSource, FsImageResolver, LayoutConfig,
    OracleConfig, Overflow, Page, PagerConfig, PagerError, Reader, Result,
};
use serde::Serialize;

/// Measurement strategy.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Estimated wrapped lines per page
    BudgetLines,
    /// Characters per page
    BudgetChars,
    /// Laid-out height on a heuristic surface
    Rendered,
}

/// Output format.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Format {
    /// Pages separated by banner lines (default)
    #[default]
    Text,
    /// JSON document with page metadata
    Json,
}

/// Paginate a diary or travel journal into viewport-sized pages.
#[derive(Parser, Debug)]
#[command(name = "diary-pager")]
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

    /// Measurement strategy; overrides the config file
    #[arg(short = 's', long, value_enum)]
    strategy: Option<Strategy>,

    /// Per-page capacity in the strategy's unit
    #[arg(long)]
    capacity: Option<u32>,

    /// Characters per line for the budget-lines strategy
    #[arg(long = "chars-per-line", default_value = "42")]
    chars_per_line: u32,

    /// Viewport width in pixels
    #[arg(short = 'W', long, default_value = "390")]
    width: u32,

    /// Viewport height in pixels
    #[arg(short = 'H', long, default_value = "844")]
    height: u32,

    /// Minimum asterisk run that forms a section rule
    #[arg(long = "separator-min-stars")]
    separator_min_stars: Option<usize>,

    /// Image directory to probe; repeatable. Defaults to the book's images/
    #[arg(short = 'i', long = "image-dir")]
    image_dirs: Vec<PathBuf>,

    /// Print only this page (1-indexed)
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u64).range(1..))]
    page: Option<u64>,

    /// Output format
    #[arg(short = 't', long = "format", value_enum, default_value = "text")]
    format: Format,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

#[derive(Serialize)]
struct DocumentView<'a> {
    id: &'a str,
    page_count: usize,
    load_error: Option<String>,
    pages: Vec<PageView>,
}

#[derive(Serialize)]
struct PageView {
    number: usize,
    start: Cursor,
    end: Cursor,
    overflow: Option<Overflow>,
    blocks: usize,
    text: String,
}

impl PageView {
    fn new(page: &Page) -> Self {
        Self {
            number: page.index + 1,
            start: page.start,
            end: page.end,
            overflow: page.overflow,
            blocks: page.blocks.len(),
            text: page.plain_text(),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when the document could not be loaded.
fn run(args: &Args) -> Result<bool> {
    let config = pager_config(args)?;
    let mut reader = open_reader(args, &config)?;
    if let Some(err) = reader.load_error() {
        eprintln!("warning: {err}");
    }
    let page_count = reader.build_all();
    let page_index = args
        .page
        .map(|number| usize::try_from(number - 1).unwrap_or(usize::MAX));
    if let Some(index) = page_index {
        reader.page(index)?;
    }
    let pages = reader.navigator().session().built_pages();
    let selected: Vec<&Page> = match page_index {
        Some(index) => pages.iter().filter(|page| page.index == index).collect(),
        None => pages.iter().collect(),
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match args.format {
        Format::Text => write_text(&mut out, &selected, page_count),
        Format::Json => {
            let view = DocumentView {
                id: reader.id(),
                page_count,
                load_error: reader.load_error().map(ToString::to_string),
                pages: selected.iter().map(|page| PageView::new(page)).collect(),
            };
            serde_json::to_writer_pretty(&mut out, &view)
                .map_err(|err| stdout_error(err.into()))?;
            writeln!(out).map_err(stdout_error)
        }
    }?;
    out.flush().map_err(stdout_error)?;
    Ok(!reader.is_placeholder())
}

fn pager_config(args: &Args) -> Result<PagerConfig> {
    let mut config = match &args.config {
        Some(path) => PagerConfig::load(path)?,
        None => PagerConfig::default(),
    };
    if let Some(stars) = args.separator_min_stars {
        config.tokenizer = config.tokenizer.with_separator_min_stars(stars);
    }
    config.oracle = match (args.strategy, config.oracle) {
        (Some(Strategy::BudgetLines), _) => OracleConfig::Budget(BudgetConfig::lines(
            args.capacity.unwrap_or(24),
            args.chars_per_line,
        )),
        (Some(Strategy::BudgetChars), _) => OracleConfig::Budget(match args.capacity {
            Some(capacity) => BudgetConfig::characters(capacity),
            None => BudgetConfig::for_viewport_width(args.width),
        }),
        (Some(Strategy::Rendered), _) => {
            OracleConfig::Rendered(LayoutConfig::for_display(args.width, args.height))
        }
        (None, OracleConfig::Budget(budget)) => match args.capacity {
            Some(capacity) => OracleConfig::Budget(budget.with_capacity(capacity)),
            None => OracleConfig::Budget(budget),
        },
        (None, rendered) => rendered,
    };
    Ok(config)
}

fn open_reader(args: &Args, config: &PagerConfig) -> Result<Reader> {
    if let Some(id) = &args.book {
        let source = FsDocumentSource::new(&args.books_root);
        let resolver = if args.image_dirs.is_empty() {
            FsImageResolver::for_book(&args.books_root, id)
        } else {
            FsImageResolver::new(args.image_dirs.iter().cloned())
        };
        return open_document(&source, &resolver, id, config);
    }

    let Some(path) = &args.file else {
        return Err(PagerError::SourceUnavailable {
            id: String::new(),
            reason: "pass a text file or --book".to_string(),
        });
    };
    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            let err = PagerError::SourceUnavailable {
                id: id.clone(),
                reason: format!("{}: {err}", path.display()),
            };
            return Ok(Reader::placeholder(id, config, err));
        }
    };
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let resolver = if args.image_dirs.is_empty() {
        FsImageResolver::new([base.join("images")])
    } else {
        FsImageResolver::new(args.image_dirs.iter().cloned())
    };
    Ok(Reader::from_text(id, &raw, &resolver, config))
}

fn write_text(out: &mut impl Write, pages: &[&Page], page_count: usize) -> Result<()> {
    for page in pages {
        let flag = match page.overflow {
            Some(Overflow::OversizedAtomic) => " (oversized)",
            Some(Overflow::HardSplit) => " (split)",
            None => "",
        };
        writeln!(out, "=== page {}/{page_count}{flag} ===", page.index + 1).map_err(stdout_error)?;
        writeln!(out, "{}\n", page.plain_text()).map_err(stdout_error)?;
    }
    Ok(())
}

fn stdout_error(source: io::Error) -> PagerError {
    PagerError::Io {
        path: PathBuf::from("-"),
        source,
    }
}
