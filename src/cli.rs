use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::{
    column::Column,
    config::GridOptions,
    io_utils::{parse_delimiter, parse_quote},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Staged, out-of-core transformations over delimited text", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// YAML file with grid options; flags below override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Field delimiter (supports ',', 'tab', ';', '|')
    #[arg(long, global = true, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Quote character ('double', 'single', or a literal character)
    #[arg(long, global = true, value_parser = parse_quote)]
    pub quote: Option<u8>,
    /// Read empty numeric cells as zero
    #[arg(long = "missing-as-zero", global = true)]
    pub missing_as_zero: bool,
    /// Character encoding of input files (defaults to utf-8)
    #[arg(long = "input-encoding", global = true)]
    pub input_encoding: Option<String>,
    /// Directory for staged files (defaults to the platform temp directory)
    #[arg(long = "staging-dir", global = true)]
    pub staging_dir: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn resolve(&self) -> Result<GridOptions> {
        let mut options = match &self.config {
            Some(path) => GridOptions::load(path)?,
            None => GridOptions::default(),
        };
        if let Some(delimiter) = self.delimiter {
            options.delimiter = delimiter;
        }
        if let Some(quote) = self.quote {
            options.quote = quote;
        }
        if self.missing_as_zero {
            options.missing_as_zero = true;
        }
        if let Some(encoding) = &self.input_encoding {
            options.encoding = Some(encoding.clone());
        }
        if let Some(dir) = &self.staging_dir {
            options.staging.dir = Some(dir.clone());
        }
        Ok(options)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the first rows of a file as a table
    Preview(PreviewArgs),
    /// Descriptive statistics for numeric columns
    Stats(StatsArgs),
    /// Filter, derive, sort, and project a file
    Process(ProcessArgs),
    /// Left-join a second file onto the first
    Join(JoinArgs),
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Input file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of rows to display (defaults to the configured print limit)
    #[arg(long)]
    pub rows: Option<usize>,
    /// Prefix each row with its 1-based number
    #[arg(long = "row-numbers")]
    pub row_numbers: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Input file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Columns as `name[:type]`; defaults to every column holding numbers
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Input file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Keep rows for which the expression holds, e.g. `w1 > 10 && name != "Beta"`
    #[arg(long = "filter-expr", action = clap::ArgAction::Append)]
    pub filter_exprs: Vec<String>,
    /// Derived columns as `name[:type]=expression`
    #[arg(long = "derive", action = clap::ArgAction::Append)]
    pub derives: Vec<String>,
    /// Decimal places applied to fractional derived values
    #[arg(long)]
    pub round: Option<u32>,
    /// Sort directives of the form `column[:type][:asc|desc]`
    #[arg(long = "sort", action = clap::ArgAction::Append)]
    pub sort: Vec<String>,
    /// Row range `FROM-TO` (1-based, inclusive); `FROM-` runs to the end
    #[arg(long, value_parser = parse_row_range)]
    pub rows: Option<(usize, usize)>,
    /// Keep only these columns
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Drop these columns
    #[arg(long = "exclude-columns", value_delimiter = ',')]
    pub exclude_columns: Vec<String>,
    /// Print a table instead of delimited output
    #[arg(long)]
    pub table: bool,
    /// Fail when any row recorded a conversion error
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Left input; every one of its rows is kept
    #[arg(long = "left")]
    pub left: PathBuf,
    /// Right input, held in memory as a lookup table
    #[arg(long = "right")]
    pub right: PathBuf,
    /// Key column in the left input
    #[arg(long = "left-key")]
    pub left_key: String,
    /// Key column in the right input
    #[arg(long = "right-key")]
    pub right_key: String,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Print a table instead of delimited output
    #[arg(long)]
    pub table: bool,
}

pub fn parse_row_range(value: &str) -> Result<(usize, usize), String> {
    let parse = |raw: &str| {
        raw.trim()
            .parse::<usize>()
            .map_err(|_| format!("'{raw}' is not a row number"))
    };
    match value.split_once('-') {
        Some((from, "")) => Ok((parse(from)?, 0)),
        Some((from, to)) => Ok((parse(from)?, parse(to)?)),
        None => {
            let row = parse(value)?;
            Ok((row, row))
        }
    }
}

/// Splits `name[:type]` column arguments, defaulting the type to double.
pub fn numeric_columns(specs: &[String]) -> Result<Vec<Column>> {
    specs
        .iter()
        .map(|spec| {
            let column = if spec.contains(':') {
                Column::parse(spec)?
            } else {
                Column::double(spec.trim())
            };
            Ok(column)
        })
        .collect::<Result<Vec<_>>>()
        .context("Parsing column list")
}
