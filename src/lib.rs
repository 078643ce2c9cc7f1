pub mod cli;
pub mod codec;
pub mod column;
pub mod config;
pub mod convert;
pub mod data;
pub mod derive;
pub mod error;
pub mod expr;
pub mod grid;
pub mod io_utils;
pub mod lines;
pub mod staging;
pub mod stats;
pub mod table;
pub mod value;

use std::{
    env,
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

pub use crate::{
    column::{Action, Column, ColumnType, Header, Rounding, RoundingMode, Sorting},
    config::{GridOptions, StagingBackend},
    data::Data,
    error::{ColumnError, ConversionError, FieldError, GridError},
    grid::{DataGrid, GridBuilder, JoinSpec, RowError, StageReport},
    stats::Stats,
    value::Value,
};

use crate::{
    cli::{Cli, Commands},
    derive::DerivedColumn,
    expr::RowEvaluator,
    io_utils::printable_delimiter,
    lines::{FileSink, FileSource},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("datagrid", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let options = cli.global.resolve()?;
    match cli.command {
        Commands::Preview(args) => handle_preview(&args, options),
        Commands::Stats(args) => handle_stats(&args, options),
        Commands::Process(args) => handle_process(&args, options),
        Commands::Join(args) => handle_join(&args, options),
    }
}

fn load(input: &Path, options: GridOptions) -> Result<DataGrid> {
    info!(
        "Loading '{}' with delimiter '{}'",
        input.display(),
        printable_delimiter(options.delimiter)
    );
    GridBuilder::new()
        .options(options)
        .from_path(input)
        .with_context(|| format!("Loading {input:?}"))
}

fn handle_preview(args: &cli::PreviewArgs, options: GridOptions) -> Result<()> {
    let grid = load(&args.input, options)?;
    let mut stdout = io::stdout().lock();
    grid.print_rows(&mut stdout, args.rows, args.row_numbers)?;
    Ok(())
}

fn handle_stats(args: &cli::StatsArgs, options: GridOptions) -> Result<()> {
    let grid = load(&args.input, options)?;
    let requested = cli::numeric_columns(&args.columns)?;
    let columns = if requested.is_empty() {
        grid.columns().iter().map(|name| Column::double(name.as_str())).collect()
    } else {
        requested
    };

    let mut reports = Vec::with_capacity(columns.len());
    for column in &columns {
        let stats = grid
            .get_stats(column)
            .with_context(|| format!("Computing statistics for '{}'", column.name))?;
        if args.columns.is_empty() && stats.count == 0 {
            debug!("Skipping '{}': no numeric values", column.name);
            continue;
        }
        reports.push((column.name.clone(), stats));
    }
    if reports.is_empty() {
        return Err(anyhow!("No numeric columns found in {:?}", args.input));
    }

    let mut stdout = io::stdout().lock();
    if args.json {
        let json = reports
            .iter()
            .map(|(name, stats)| serde_json::json!({ "column": name, "stats": stats }))
            .collect::<Vec<_>>();
        serde_json::to_writer_pretty(&mut stdout, &json).context("Writing statistics")?;
        writeln!(stdout)?;
    } else if let [(name, stats)] = reports.as_slice() {
        let headers = vec!["statistic".to_string(), name.clone()];
        table::write_table(&mut stdout, &headers, &stats.render_rows())?;
    } else {
        let rows = reports
            .iter()
            .map(|(name, stats)| stats.render_row(name))
            .collect::<Vec<_>>();
        table::write_table(&mut stdout, &Stats::table_headers(), &rows)?;
    }
    Ok(())
}

fn handle_process(args: &cli::ProcessArgs, options: GridOptions) -> Result<()> {
    let mut grid = load(&args.input, options)?;
    let mut reports = Vec::new();

    if !args.filter_exprs.is_empty() || !args.derives.is_empty() {
        let evaluator = RowEvaluator::new()?;
        for expr in &args.filter_exprs {
            debug!("Filtering with '{expr}'");
            reports.push(grid.filter(|row| evaluator.matches(expr, row))?);
        }
        let rounding = args.round.map(Rounding::half_up);
        for spec in &args.derives {
            let derived = DerivedColumn::parse(spec)?;
            reports.push(grid.process(
                |row| derived.evaluate(&evaluator, row),
                &derived.column,
                Action::After,
                None,
                rounding,
            )?);
        }
    }
    if !args.sort.is_empty() {
        let sortings = args
            .sort
            .iter()
            .map(|spec| Sorting::parse(spec))
            .collect::<Result<Vec<_>, _>>()?;
        reports.push(grid.sort(&sortings)?);
    }
    if let Some((from, to)) = args.rows {
        reports.push(grid.include_rows(from, to)?);
    }
    if !args.columns.is_empty() {
        reports.push(grid.include_columns(args.columns.as_slice())?);
    }
    if !args.exclude_columns.is_empty() {
        reports.push(grid.exclude_columns(args.exclude_columns.as_slice())?);
    }

    if args.strict {
        for report in reports {
            report.into_result()?;
        }
    }
    emit(&grid, args.output.as_deref(), args.table)
}

fn handle_join(args: &cli::JoinArgs, options: GridOptions) -> Result<()> {
    let encoding = io_utils::resolve_encoding(options.encoding.as_deref())?;
    let codec = options.codec();
    let mut grid = load(&args.left, options)?;
    let mut right = FileSource::open(&args.right, codec, encoding)
        .with_context(|| format!("Opening {:?}", args.right))?;
    let report = grid.join_with(&mut right, &JoinSpec::new(&args.right_key, &args.left_key))?;
    info!(
        "Joined {:?} onto {} row(s) using {} = {}",
        args.right, report.rows_written, args.left_key, args.right_key
    );
    emit(&grid, args.output.as_deref(), args.table)
}

fn emit(grid: &DataGrid, output: Option<&Path>, as_table: bool) -> Result<()> {
    if as_table {
        let mut stdout = io::stdout().lock();
        grid.print_rows(&mut stdout, Some(grid.row_count()), false)?;
        return Ok(());
    }
    let codec = grid.options().codec();
    let mut sink: FileSink = match output {
        Some(path) => FileSink::create(path, codec)?,
        None => FileSink::stdout(codec),
    };
    let rows = grid.persist(&mut sink)?;
    if let Some(path) = output {
        info!("Wrote {rows} row(s) to {path:?}");
    }
    Ok(())
}
