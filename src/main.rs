#![warn(clippy::unwrap_used)]
#![doc = include_str!("../README.md")]

mod categories;
mod model;
mod parser;
mod resolver;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{anyhow, Context};
use color_eyre::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use categories::CategoryIndex;
use model::{Expense, Nsf};
use parser::StatementParser;
use resolver::resolve_corrections;

/// Sorts transactions from bank and credit-card statement PDFs into spending categories
#[derive(Debug, Parser)]
struct Args {
    /// Directory containing the statement PDF files
    #[arg(long, default_value = "statements")]
    statements: PathBuf,
    /// Category configuration file
    #[arg(long, default_value = "categories.json")]
    categories: PathBuf,
    /// Destination directory for the CSV files
    #[arg(long, default_value = "output")]
    output: PathBuf,
    /// Prints debug output while parsing
    #[arg(long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parses the statements and writes the categorized expenses to CSV
    Process {
        /// A single statement PDF; defaults to every file in the statements directory
        statement: Option<PathBuf>,
    },
    /// Lists the configured categories in match order
    ListCategories,
    /// Lists the statement files that would be processed
    ListFiles,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// The ISO date encoded as the trailing 10 characters of a statement's file
/// stem. Its year seeds the statement's date tracker.
fn statement_start_date(stem: &str) -> Option<NaiveDate> {
    let tail = stem.len().checked_sub(10).and_then(|start| stem.get(start..))?;
    NaiveDate::parse_from_str(tail, "%Y-%m-%d").ok()
}

/// The statement files to process, in sorted name order.
fn statement_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Could not read statements directory {dir:?}"))?
    {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses one statement: extracts the PDF text, splits it into pages on form
/// feeds, and scans each page while carrying the previous-line context across
/// page boundaries.
fn parse_statement(
    parser: &mut StatementParser<'_>,
    path: &Path,
) -> Result<(Vec<Expense>, Vec<Nsf>)> {
    let text = pdf_extract::extract_text_from_mem(
        &fs::read(path).with_context(|| format!("Could not read statement file {path:?}"))?,
    )
    .with_context(|| format!("Could not extract PDF content from file {path:?}"))?;

    let mut expenses = Vec::new();
    let mut nsfs = Vec::new();
    let mut previous_line = String::new();
    for (page_number, page_text) in text.split('\u{c}').enumerate() {
        debug!(page = page_number + 1, "processing page");
        let lines: Vec<&str> = page_text.lines().collect();
        let scan = parser.process_page(&lines, &previous_line)?;
        expenses.extend(scan.expenses);
        nsfs.extend(scan.nsfs);
        previous_line = scan.last_line;
    }
    Ok((expenses, nsfs))
}

/// Processes a batch of statements sequentially.
///
/// A statement whose name does not end in a valid ISO date is skipped; a
/// statement no format matches is a configuration error for the whole run; a
/// parse failure aborts that statement only and the batch carries on with the
/// records accumulated from the other statements.
fn process_statements(
    paths: &[PathBuf],
    categories: &CategoryIndex,
) -> Result<(Vec<Expense>, Vec<Nsf>)> {
    let mut all_expenses = Vec::new();
    let mut all_nsfs = Vec::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!("{path:?} is not a valid statement file, skipping");
            continue;
        };
        let Some(start_date) = statement_start_date(stem) else {
            warn!("{stem} is not a valid statement file, skipping");
            continue;
        };
        debug!(%start_date, "processing statement {stem}");
        let mut parser = StatementParser::for_statement(stem, start_date, categories)
            .ok_or_else(|| anyhow!("Could not find a parser for {path:?}"))?;
        match parse_statement(&mut parser, path) {
            Ok((expenses, nsfs)) => {
                all_expenses.extend(expenses);
                all_nsfs.extend(nsfs);
            }
            Err(err) => error!("skipping statement {path:?}: {err:#}"),
        }
    }
    Ok((all_expenses, all_nsfs))
}

fn write_to_csv<T: Serialize>(records: &[T], file: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(file).with_context(|| format!("Could not create {file:?}"))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn process(args: &Args, statement: Option<&Path>) -> Result<()> {
    let categories = CategoryIndex::from_path(&args.categories)?;
    if categories.is_empty() {
        warn!("no category rules configured, nothing will match");
    }
    let paths = match statement {
        Some(path) => vec![path.to_path_buf()],
        None => statement_files(&args.statements)?,
    };
    let (expenses, nsfs) = process_statements(&paths, &categories)?;
    let mut expenses = resolve_corrections(expenses);
    expenses.sort_by_key(|expense| expense.date);

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Could not create output directory {:?}", args.output))?;
    write_to_csv(&expenses, &args.output.join("expenses.csv"))?;
    write_to_csv(&nsfs, &args.output.join("nsf.csv"))?;
    info!(
        expenses = expenses.len(),
        nsfs = nsfs.len(),
        "wrote CSV files to {:?}",
        args.output
    );
    Ok(())
}

fn list_categories(path: &Path) -> Result<()> {
    let categories = CategoryIndex::from_path(path)?;
    for rule in categories.iter() {
        println!(
            "{} / {}: {} ({})",
            rule.page,
            rule.category,
            rule.pattern,
            rule.display_label()
        );
    }
    Ok(())
}

fn list_files(dir: &Path) -> Result<()> {
    for path in statement_files(dir)? {
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            println!("{name}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Process { statement } => process(&args, statement.as_deref()),
        Command::ListCategories => list_categories(&args.categories),
        Command::ListFiles => list_files(&args.statements),
    }
}
