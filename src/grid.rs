//! The staged transformation pipeline.
//!
//! A [`DataGrid`] streams its source once into a first stage, then every
//! mutating call reads the current stage row by row and writes a fresh one,
//! swapping the current pointer only after the new stage is complete. A
//! failed operation therefore leaves the grid exactly as it was.
//!
//! Row-level conversion failures never abort an operation; they are
//! collected in the [`StageReport`] the operation returns. Schema mistakes
//! (unknown columns, duplicate names) and I/O failures abort it.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    io::{self, Write},
    path::Path,
};

use itertools::kmerge_by;
use log::{debug, info, warn};
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{
    codec::Row,
    column::{Action, Column, ColumnType, Header, Rounding, Sorting},
    config::GridOptions,
    convert::ConverterRegistry,
    data::Data,
    error::{ColumnError, ConversionError, FieldError, GridError, Result},
    io_utils,
    lines::{FileSource, LineSink, LineSource, ListSource, RemoteSource, TextSource, copy_rows},
    staging::{Stage, StageArena},
    stats::Stats,
    table,
    value::{ComparableValue, Value, decimal_from_f64},
};

/// A recoverable failure tied to the 1-based row it happened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub error: ConversionError,
}

/// Outcome of one mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub operation: &'static str,
    pub rows_read: usize,
    pub rows_written: usize,
    pub errors: Vec<RowError>,
}

impl StageReport {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            rows_read: 0,
            rows_written: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turns recorded row errors into a [`GridError::RowErrors`].
    ///
    /// The grid has already advanced to the new stage either way.
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(GridError::RowErrors {
                operation: self.operation,
                count: self.errors.len(),
            })
        }
    }
}

/// How [`DataGrid::join_with`] matches rows and where the joined columns go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Key column in the joined source.
    pub other_key: String,
    /// Key column in this grid.
    pub this_key: String,
    pub action: Action,
    /// Column the joined block is placed relative to; appended when `None`.
    pub reference: Option<String>,
}

impl JoinSpec {
    pub fn new(other_key: impl Into<String>, this_key: impl Into<String>) -> Self {
        Self {
            other_key: other_key.into(),
            this_key: this_key.into(),
            action: Action::After,
            reference: None,
        }
    }

    pub fn placed(mut self, action: Action, reference: impl Into<String>) -> Self {
        self.action = action;
        self.reference = Some(reference.into());
        self
    }
}

/// Configures and constructs a [`DataGrid`].
#[derive(Debug, Clone, Default)]
pub struct GridBuilder {
    options: GridOptions,
    registry: ConverterRegistry,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: GridOptions) -> Self {
        self.options = options;
        self
    }

    pub fn register_input<F>(mut self, ty: ColumnType, converter: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ConversionError> + 'static,
    {
        self.registry.register_input(ty, converter);
        self
    }

    pub fn register_output<F>(mut self, ty: ColumnType, converter: F) -> Self
    where
        F: Fn(&Value) -> Result<String, ConversionError> + 'static,
    {
        self.registry.register_output(ty, converter);
        self
    }

    pub fn from_source(self, source: &mut dyn LineSource) -> Result<DataGrid> {
        DataGrid::load(self.options, self.registry, source)
    }

    pub fn from_path(self, path: impl AsRef<Path>) -> Result<DataGrid> {
        let path = path.as_ref();
        let encoding = io_utils::resolve_encoding(self.options.encoding.as_deref())?;
        let mut source = FileSource::open(path, self.options.codec(), encoding)?;
        self.from_source(&mut source)
    }

    pub fn from_text(self, text: impl Into<String>) -> Result<DataGrid> {
        let mut source = TextSource::from_text(text, self.options.codec());
        self.from_source(&mut source)
    }

    /// First row is the header.
    pub fn from_rows(self, rows: Vec<Row>) -> Result<DataGrid> {
        let mut source = ListSource::new(rows);
        self.from_source(&mut source)
    }

    /// Column-major input: `(name, values)` pairs. Shorter columns are padded
    /// with empty cells.
    pub fn from_columns(self, columns: Vec<(String, Vec<String>)>) -> Result<DataGrid> {
        let height = columns.iter().map(|(_, values)| values.len()).max().unwrap_or(0);
        let mut rows = Vec::with_capacity(height + 1);
        rows.push(columns.iter().map(|(name, _)| name.clone()).collect::<Row>());
        let mut iters = columns
            .into_iter()
            .map(|(_, values)| values.into_iter())
            .collect::<Vec<_>>();
        for _ in 0..height {
            rows.push(
                iters
                    .iter_mut()
                    .map(|values| values.next().unwrap_or_default())
                    .collect(),
            );
        }
        if rows[0].is_empty() {
            return Err(GridError::EmptyDataset);
        }
        self.from_rows(rows)
    }

    pub fn from_url(self, url: &str) -> Result<DataGrid> {
        let mut source = RemoteSource::get(url, self.options.codec())?;
        self.from_source(&mut source)
    }
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    /// Write into an existing column.
    Overwrite(usize),
    /// Swap out the column at this position.
    Replace(usize),
    /// Insert a new column at this position.
    Insert(usize),
}

struct SortEntry {
    keys: Vec<ComparableValue>,
    ordinal: usize,
    row: Row,
}

#[derive(Debug)]
pub struct DataGrid {
    options: GridOptions,
    registry: ConverterRegistry,
    arena: StageArena,
    header: Header,
    row_count: usize,
    join_counter: usize,
}

impl DataGrid {
    pub fn builder() -> GridBuilder {
        GridBuilder::new()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        GridBuilder::new().from_path(path)
    }

    pub fn from_text(text: impl Into<String>) -> Result<Self> {
        GridBuilder::new().from_text(text)
    }

    fn load(
        options: GridOptions,
        registry: ConverterRegistry,
        source: &mut dyn LineSource,
    ) -> Result<Self> {
        let mut arena = StageArena::new(&options.staging, options.codec())?;
        let Some(names) = source.read_row()? else {
            source.close();
            return Err(GridError::EmptyDataset);
        };
        let header = Header::new(names)?;
        let mut writer = arena.create()?;
        writer.write_row(header.names())?;
        let mut rows = 0usize;
        while let Some(mut row) = source.read_row().map_err(|err| err.at("load", rows + 1))? {
            rows += 1;
            fit_width(&mut row, header.len()).map_err(|err| err.at("load", rows))?;
            writer.write_row(&row).map_err(|err| err.at("load", rows))?;
        }
        source.close();
        arena.commit(writer.finish()?);
        info!(
            "Loaded {rows} row(s) across {} column(s) into {:?} staging",
            header.len(),
            arena.backend()
        );
        Ok(Self {
            options,
            registry,
            arena,
            header,
            row_count: rows,
            join_counter: 0,
        })
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn columns(&self) -> &[String] {
        self.header.names()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Joins performed so far; the next join suffixes its columns with this plus one.
    pub fn join_counter(&self) -> usize {
        self.join_counter
    }

    /// File backing the current stage, if the grid stages to disk.
    pub fn stage_path(&self) -> Option<&Path> {
        self.arena.current().and_then(Stage::path)
    }

    fn data<'a>(&'a self, row: &'a [String]) -> Data<'a> {
        Data::new(&self.header, row, &self.registry, self.options.missing_as_zero)
    }

    /// Opens the current stage positioned after its header.
    fn open_rows(&self) -> Result<FileSource> {
        let mut source = self.arena.open_current()?;
        source.read_row()?;
        Ok(source)
    }

    /// Streams the current stage through `step` into a new stage headed by `header`.
    ///
    /// `step` receives the 1-based ordinal and the row padded to the current
    /// width, and returns the row to write, if any. Its errors are tagged
    /// with `operation` and the ordinal.
    fn stream<F>(&self, operation: &'static str, header: &Header, mut step: F) -> Result<(Stage, StageReport)>
    where
        F: FnMut(usize, Row, &mut Vec<RowError>) -> Result<Option<Row>>,
    {
        let mut source = self.open_rows()?;
        let mut writer = self.arena.create()?;
        writer.write_row(header.names())?;
        let mut report = StageReport::new(operation);
        while let Some(mut row) = source
            .read_row()
            .map_err(|err| err.at(operation, report.rows_read + 1))?
        {
            report.rows_read += 1;
            let ordinal = report.rows_read;
            row.resize(self.header.len().max(row.len()), String::new());
            let Some(out) = step(ordinal, row, &mut report.errors).map_err(|err| err.at(operation, ordinal))?
            else {
                continue;
            };
            writer.write_row(&out).map_err(|err| err.at(operation, ordinal))?;
            report.rows_written += 1;
        }
        source.close();
        Ok((writer.finish()?, report))
    }

    fn install(&mut self, header: Header, stage: Stage, report: StageReport) -> StageReport {
        self.arena.commit(stage);
        self.header = header;
        self.row_count = report.rows_written;
        if self.options.log_data_errors {
            for failure in &report.errors {
                warn!("{}: row {}: {}", report.operation, failure.row, failure.error);
            }
        }
        info!(
            "{}: {} row(s) in, {} row(s) out, {} row error(s)",
            report.operation,
            report.rows_read,
            report.rows_written,
            report.errors.len()
        );
        report
    }

    /// Keeps the rows for which `predicate` holds.
    ///
    /// A row whose predicate fails to convert a value is dropped and recorded.
    pub fn filter<F>(&mut self, mut predicate: F) -> Result<StageReport>
    where
        F: FnMut(&Data<'_>) -> Result<bool, FieldError>,
    {
        let header = self.header.clone();
        let (stage, report) = self.stream("filter", &header, |ordinal, row, errors| {
            let verdict = predicate(&self.data(&row).with_ordinal(ordinal));
            match verdict {
                Ok(true) => Ok(Some(row)),
                Ok(false) => Ok(None),
                Err(FieldError::Conversion(error)) => {
                    errors.push(RowError { row: ordinal, error });
                    Ok(None)
                }
                Err(FieldError::Column(err)) => Err(err.into()),
            }
        })?;
        Ok(self.install(header, stage, report))
    }

    /// Computes `result` for every row and places it relative to `reference`.
    ///
    /// With no reference the value is appended, or written in place when
    /// `result` names an existing column. A derivation that returns `None`
    /// or fails to convert leaves a new cell empty and an existing cell
    /// untouched.
    pub fn process<F>(
        &mut self,
        mut derivation: F,
        result: &Column,
        action: Action,
        reference: Option<&str>,
        rounding: Option<Rounding>,
    ) -> Result<StageReport>
    where
        F: FnMut(&Data<'_>) -> Result<Option<Value>, FieldError>,
    {
        let mut names = self.header.names().to_vec();
        let placement = match reference {
            None => match self.header.position(&result.name) {
                Ok(idx) => Placement::Overwrite(idx),
                Err(_) => Placement::Insert(names.len()),
            },
            Some(reference) => {
                let idx = self.header.position(reference)?;
                match action {
                    Action::Before => Placement::Insert(idx),
                    Action::After => Placement::Insert(idx + 1),
                    Action::Replace => Placement::Replace(idx),
                }
            }
        };
        match placement {
            Placement::Overwrite(_) => {}
            Placement::Replace(idx) => names[idx] = result.name.clone(),
            Placement::Insert(idx) => names.insert(idx, result.name.clone()),
        }
        let header = Header::new(names)?;

        let (stage, report) = self.stream("process", &header, |ordinal, mut row, errors| {
            let derived = derivation(&self.data(&row).with_ordinal(ordinal))
                .and_then(|value| match value {
                    Some(value) => self.render_value(result, value, rounding).map(Some),
                    None => Ok(None),
                });
            let cell = match derived {
                Ok(cell) => cell,
                Err(FieldError::Conversion(error)) => {
                    errors.push(RowError { row: ordinal, error });
                    None
                }
                Err(FieldError::Column(err)) => return Err(err.into()),
            };
            match placement {
                Placement::Overwrite(idx) => {
                    if let Some(cell) = cell {
                        row[idx] = cell;
                    }
                }
                Placement::Replace(idx) => row[idx] = cell.unwrap_or_default(),
                Placement::Insert(idx) => row.insert(idx, cell.unwrap_or_default()),
            }
            Ok(Some(row))
        })?;
        Ok(self.install(header, stage, report))
    }

    fn render_value(&self, column: &Column, value: Value, rounding: Option<Rounding>) -> Result<String, FieldError> {
        let value = match rounding {
            Some(rounding) => round_value(value, rounding),
            None => value,
        };
        self.registry.render(column.ty, &value)
    }

    /// Keeps only the named columns, in their current order.
    pub fn include_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Result<StageReport> {
        let wanted = self.positions(names)?;
        let keep = (0..self.header.len()).filter(|idx| wanted.contains(idx)).collect();
        self.project("include_columns", keep)
    }

    pub fn exclude_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Result<StageReport> {
        let dropped = self.positions(names)?;
        let keep = (0..self.header.len()).filter(|idx| !dropped.contains(idx)).collect();
        self.project("exclude_columns", keep)
    }

    /// Keeps the contiguous block of columns between `from` and `to`, inclusive.
    pub fn include_column_range(&mut self, from: &str, to: &str) -> Result<StageReport> {
        let keep = self.header.range(from, to)?;
        self.project("include_column_range", keep)
    }

    pub fn exclude_column_range(&mut self, from: &str, to: &str) -> Result<StageReport> {
        let dropped = self.header.range(from, to)?.into_iter().collect::<HashSet<_>>();
        let keep = (0..self.header.len()).filter(|idx| !dropped.contains(idx)).collect();
        self.project("exclude_column_range", keep)
    }

    fn positions<S: AsRef<str>>(&self, names: &[S]) -> Result<HashSet<usize>, ColumnError> {
        names
            .iter()
            .map(|name| self.header.position(name.as_ref()))
            .collect()
    }

    fn project(&mut self, operation: &'static str, keep: Vec<usize>) -> Result<StageReport> {
        let names = keep
            .iter()
            .map(|&idx| self.header.names()[idx].clone())
            .collect::<Vec<_>>();
        let header = Header::new(names)?;
        let (stage, report) = self.stream(operation, &header, |_, mut row, _| {
            Ok(Some(keep.iter().map(|&idx| std::mem::take(&mut row[idx])).collect()))
        })?;
        Ok(self.install(header, stage, report))
    }

    /// Keeps rows `from..=to` (1-based); `to == 0` runs to the last row.
    pub fn include_rows(&mut self, from: usize, to: usize) -> Result<StageReport> {
        let range = row_range(from, to)?;
        self.select_rows("include_rows", |ordinal| range(ordinal))
    }

    /// Drops rows `from..=to` (1-based); `to == 0` runs to the last row.
    pub fn exclude_rows(&mut self, from: usize, to: usize) -> Result<StageReport> {
        let range = row_range(from, to)?;
        self.select_rows("exclude_rows", |ordinal| !range(ordinal))
    }

    fn select_rows(&mut self, operation: &'static str, keep: impl Fn(usize) -> bool) -> Result<StageReport> {
        let header = self.header.clone();
        let (stage, report) = self.stream(operation, &header, |ordinal, row, _| {
            Ok(keep(ordinal).then_some(row))
        })?;
        Ok(self.install(header, stage, report))
    }

    /// Stable external merge sort on `sortings`, earlier keys first.
    ///
    /// Chunks of `sort_chunk_rows` rows are sorted in memory; when the data
    /// needs more than one chunk, each is spilled to a run stage and the runs
    /// are merged. Keys that fail to convert sort as missing, before every
    /// value in either direction, and are recorded.
    pub fn sort(&mut self, sortings: &[Sorting]) -> Result<StageReport> {
        const OPERATION: &str = "sort";
        for sorting in sortings {
            self.header.position(&sorting.column.name)?;
        }
        let chunk_rows = self.options.sort_chunk_rows.max(1);
        let mut report = StageReport::new(OPERATION);
        let mut source = self.open_rows()?;
        let mut chunk: Vec<SortEntry> = Vec::new();
        let mut runs: Vec<Stage> = Vec::new();

        while let Some(row) = source
            .read_row()
            .map_err(|err| err.at(OPERATION, report.rows_read + 1))?
        {
            report.rows_read += 1;
            let ordinal = report.rows_read;
            let keys = self
                .sort_keys(&row, sortings, ordinal, Some(&mut report.errors))
                .map_err(|err| err.at(OPERATION, ordinal))?;
            chunk.push(SortEntry { keys, ordinal, row });
            if chunk.len() >= chunk_rows {
                runs.push(self.spill_run(&mut chunk, sortings)?);
            }
        }
        source.close();

        let mut writer = self.arena.create()?;
        writer.write_row(self.header.names())?;
        if runs.is_empty() {
            chunk.sort_by(|a, b| compare_entries(a, b, sortings));
            for entry in chunk {
                writer.write_row(&entry.row)?;
                report.rows_written += 1;
            }
        } else {
            if !chunk.is_empty() {
                runs.push(self.spill_run(&mut chunk, sortings)?);
            }
            debug!("Merging {} sorted run(s)", runs.len());
            let readers = runs
                .iter()
                .map(|run| {
                    run.open(self.arena.codec())
                        .map(|source| RunReader::new(source, self, sortings))
                })
                .collect::<Result<Vec<_>>>()?;
            let merged = kmerge_by(readers, |a: &Result<SortEntry>, b: &Result<SortEntry>| match (a, b) {
                (Err(_), _) => true,
                (_, Err(_)) => false,
                (Ok(a), Ok(b)) => compare_entries(a, b, sortings) == Ordering::Less,
            });
            for entry in merged {
                let entry = entry.map_err(|err| err.at(OPERATION, report.rows_written + 1))?;
                writer.write_row(&entry.row)?;
                report.rows_written += 1;
            }
        }
        let stage = writer.finish()?;
        let header = self.header.clone();
        Ok(self.install(header, stage, report))
    }

    fn sort_keys(
        &self,
        row: &[String],
        sortings: &[Sorting],
        ordinal: usize,
        mut errors: Option<&mut Vec<RowError>>,
    ) -> Result<Vec<ComparableValue>> {
        let data = self.data(row).with_ordinal(ordinal);
        sortings
            .iter()
            .map(|sorting| match data.get_column(&sorting.column) {
                Ok(value) => Ok(ComparableValue(Some(value))),
                Err(FieldError::Conversion(error)) => {
                    if let Some(errors) = errors.as_deref_mut() {
                        errors.push(RowError { row: ordinal, error });
                    }
                    Ok(ComparableValue(None))
                }
                Err(FieldError::Column(err)) => Err(err.into()),
            })
            .collect()
    }

    /// Sorts `chunk` and writes it to a run stage, each row prefixed with its ordinal.
    fn spill_run(&self, chunk: &mut Vec<SortEntry>, sortings: &[Sorting]) -> Result<Stage> {
        chunk.sort_by(|a, b| compare_entries(a, b, sortings));
        let mut writer = self.arena.create()?;
        for entry in chunk.drain(..) {
            let mut row = Vec::with_capacity(entry.row.len() + 1);
            row.push(entry.ordinal.to_string());
            row.extend(entry.row);
            writer.write_row(&row)?;
        }
        let run = writer.finish()?;
        debug!("Spilled sort run of {} row(s)", run.rows());
        Ok(run)
    }

    /// Left-outer join against `other`, keyed on the raw text of both key columns.
    ///
    /// Every column of `other` is carried over under the name `{name}_{n}`,
    /// where `n` counts this grid's joins, plus a further `_{k}` if that name
    /// is still taken. When `other` repeats a key the last row wins.
    pub fn join_with(&mut self, other: &mut dyn LineSource, spec: &JoinSpec) -> Result<StageReport> {
        const OPERATION: &str = "join_with";
        let this_key = self.header.position(&spec.this_key)?;

        let Some(other_names) = other.read_row()? else {
            other.close();
            return Err(GridError::EmptyDataset);
        };
        let other_header = Header::new(other_names)?;
        let other_key = other_header.position(&spec.other_key)?;
        let width = other_header.len();
        let mut lookup: HashMap<String, Row> = HashMap::new();
        let mut other_rows = 0usize;
        while let Some(mut row) = other.read_row().map_err(|err| err.at(OPERATION, other_rows + 1))? {
            other_rows += 1;
            row.resize(width.max(row.len()), String::new());
            row.truncate(width);
            lookup.insert(row[other_key].clone(), row);
        }
        other.close();
        debug!("Join lookup holds {} key(s) from {other_rows} row(s)", lookup.len());

        let (insert_at, replaced) = match &spec.reference {
            None => (self.header.len(), None),
            Some(reference) => {
                let idx = self.header.position(reference)?;
                match spec.action {
                    Action::Before => (idx, None),
                    Action::After => (idx + 1, None),
                    Action::Replace => (idx, Some(idx)),
                }
            }
        };

        let version = self.join_counter + 1;
        let mut names = self.header.names().to_vec();
        if let Some(idx) = replaced {
            names.remove(idx);
        }
        let mut taken = names.iter().cloned().collect::<HashSet<_>>();
        let joined = other_header
            .names()
            .iter()
            .map(|name| {
                let base = format!("{name}_{version}");
                let mut candidate = base.clone();
                let mut k = 1;
                while taken.contains(&candidate) {
                    candidate = format!("{base}_{k}");
                    k += 1;
                }
                taken.insert(candidate.clone());
                candidate
            })
            .collect::<Vec<_>>();
        names.splice(insert_at..insert_at, joined).for_each(drop);
        let header = Header::new(names)?;

        let blank = vec![String::new(); width];
        let (stage, report) = self.stream(OPERATION, &header, |_, mut row, _| {
            let matched = lookup.get(&row[this_key]).unwrap_or(&blank);
            if let Some(idx) = replaced {
                row.remove(idx);
            }
            row.splice(insert_at..insert_at, matched.iter().cloned()).for_each(drop);
            Ok(Some(row))
        })?;
        self.join_counter = version;
        Ok(self.install(header, stage, report))
    }

    /// Reads `column` from every row.
    pub fn extract_column_values(&self, column: &Column) -> Result<Vec<Value>> {
        const OPERATION: &str = "extract_column_values";
        self.header.position(&column.name)?;
        let mut source = self.open_rows()?;
        let mut values = Vec::with_capacity(self.row_count);
        let mut ordinal = 0usize;
        while let Some(row) = source.read_row().map_err(|err| err.at(OPERATION, ordinal + 1))? {
            ordinal += 1;
            let value = self
                .data(&row)
                .with_ordinal(ordinal)
                .get_column(column)
                .map_err(|err| GridError::from(err).at(OPERATION, ordinal))?;
            values.push(value);
        }
        source.close();
        Ok(values)
    }

    /// Reads `columns` from the 1-based row `row`.
    pub fn extract_row_values(&self, row: usize, columns: &[Column]) -> Result<Vec<Value>> {
        let fields = self.row(row)?;
        let data = self.data(&fields).with_ordinal(row);
        columns
            .iter()
            .map(|column| {
                data.get_column(column)
                    .map_err(|err| GridError::from(err).at("extract_row_values", row))
            })
            .collect()
    }

    /// Raw fields of the 1-based row `n`.
    pub fn row(&self, n: usize) -> Result<Row> {
        if n == 0 || n > self.row_count {
            return Err(GridError::RowNotFound(n));
        }
        let mut source = self.open_rows()?;
        for _ in 1..n {
            source.read_row()?;
        }
        let row = source.read_row()?.ok_or(GridError::RowNotFound(n))?;
        source.close();
        Ok(row)
    }

    /// Descriptive statistics over a numeric column.
    ///
    /// Cells that are not numbers are skipped. Empty cells count as zero when
    /// `missing_as_zero` is set and are skipped otherwise.
    pub fn get_stats(&self, column: &Column) -> Result<Stats> {
        const OPERATION: &str = "get_stats";
        if !column.ty.is_numeric() {
            return Err(GridError::InvalidArgument(format!(
                "Statistics need a numeric column, '{}' is {}",
                column.name, column.ty
            )));
        }
        let idx = self.header.position(&column.name)?;
        let mut source = self.open_rows()?;
        let mut values = Vec::new();
        let mut ordinal = 0usize;
        while let Some(row) = source.read_row().map_err(|err| err.at(OPERATION, ordinal + 1))? {
            ordinal += 1;
            let empty = row.get(idx).is_none_or(|raw| raw.trim().is_empty());
            if empty && !self.options.missing_as_zero {
                continue;
            }
            match self.data(&row).get_column(column) {
                Ok(value) => values.extend(value.as_f64()),
                Err(FieldError::Conversion(_)) => {}
                Err(err) => return Err(GridError::from(err).at(OPERATION, ordinal)),
            }
        }
        source.close();
        debug!("Statistics for '{}' over {} value(s)", column.name, values.len());
        Ok(Stats::from_values(&values))
    }

    /// Prints up to `limit` rows as a table (the configured print limit when
    /// `None`), optionally with a leading row-number column. Returns the
    /// number of rows printed.
    pub fn print_rows(&self, out: &mut dyn Write, limit: Option<usize>, row_numbers: bool) -> Result<usize> {
        let limit = limit.unwrap_or(self.options.print_limit);
        let mut headers = Vec::with_capacity(self.header.len() + 1);
        if row_numbers {
            headers.push("#".to_string());
        }
        headers.extend(self.header.names().iter().cloned());

        let mut source = self.open_rows()?;
        let mut rows = Vec::new();
        while rows.len() < limit {
            let Some(row) = source.read_row().map_err(|err| err.at("print_rows", rows.len() + 1))? else {
                break;
            };
            let mut line = Vec::with_capacity(headers.len());
            if row_numbers {
                line.push((rows.len() + 1).to_string());
            }
            line.extend(row);
            rows.push(line);
        }
        source.close();
        table::write_table(out, &headers, &rows).map_err(|err| GridError::io("Printing rows", err))?;
        Ok(rows.len())
    }

    /// Prints one statistics line per column.
    pub fn print_grid_stats(&self, out: &mut dyn Write, columns: &[Column]) -> Result<()> {
        let rows = columns
            .iter()
            .map(|column| Ok(self.get_stats(column)?.render_row(&column.name)))
            .collect::<Result<Vec<_>>>()?;
        table::write_table(out, &Stats::table_headers(), &rows)
            .map_err(|err| GridError::io("Printing statistics", err))
    }

    /// Streams header and rows into `sink`, then closes it. Returns the number
    /// of data rows written.
    pub fn persist(&self, sink: &mut dyn LineSink) -> Result<usize> {
        let mut source = self.arena.open_current()?;
        let copied = copy_rows(&mut source, sink)?;
        info!("persist: {} row(s) out", copied.saturating_sub(1));
        Ok(copied.saturating_sub(1))
    }
}

/// Reads back a spilled run, recomputing sort keys.
struct RunReader<'g> {
    source: FileSource,
    grid: &'g DataGrid,
    sortings: &'g [Sorting],
}

impl<'g> RunReader<'g> {
    fn new(source: FileSource, grid: &'g DataGrid, sortings: &'g [Sorting]) -> Self {
        Self {
            source,
            grid,
            sortings,
        }
    }

    fn entry(&self, mut row: Row) -> Result<SortEntry> {
        let ordinal = row
            .first()
            .and_then(|raw| raw.parse::<usize>().ok())
            .ok_or_else(|| {
                GridError::io(
                    "Reading sort run",
                    io::Error::new(io::ErrorKind::InvalidData, "run row has no ordinal"),
                )
            })?;
        row.remove(0);
        let keys = self.grid.sort_keys(&row, self.sortings, ordinal, None)?;
        Ok(SortEntry { keys, ordinal, row })
    }
}

impl Iterator for RunReader<'_> {
    type Item = Result<SortEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.source.read_row() {
            Ok(Some(row)) => Some(self.entry(row)),
            Ok(None) => {
                self.source.close();
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}

fn compare_entries(a: &SortEntry, b: &SortEntry, sortings: &[Sorting]) -> Ordering {
    for (idx, sorting) in sortings.iter().enumerate() {
        let (left, right) = (&a.keys[idx], &b.keys[idx]);
        let ord = match (&left.0, &right.0) {
            (Some(l), Some(r)) if !sorting.ascending => r.cmp(l),
            _ => left.cmp(right),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.ordinal.cmp(&b.ordinal)
}

fn row_range(from: usize, to: usize) -> Result<impl Fn(usize) -> bool> {
    if from == 0 {
        return Err(GridError::InvalidArgument("Row numbers start at 1".into()));
    }
    if to != 0 && to < from {
        return Err(GridError::InvalidArgument(format!(
            "Row range {from}..{to} is reversed"
        )));
    }
    Ok(move |ordinal: usize| ordinal >= from && (to == 0 || ordinal <= to))
}

/// Pads a short row; a row wider than the header is malformed.
fn fit_width(row: &mut Row, width: usize) -> Result<()> {
    if row.len() > width {
        return Err(GridError::InvalidArgument(format!(
            "Row has {} field(s) but the header has {width}",
            row.len()
        )));
    }
    row.resize(width, String::new());
    Ok(())
}

fn round_value(value: Value, rounding: Rounding) -> Value {
    if !value.column_type().is_fractional() {
        return value;
    }
    let round = |d: Decimal| d.round_dp_with_strategy(rounding.decimals, rounding.mode.strategy());
    match value {
        Value::Double(f) => decimal_from_f64(f)
            .and_then(|d| round(d).to_f64())
            .map_or(Value::Double(f), Value::Double),
        Value::Float(f) => f
            .to_string()
            .parse::<Decimal>()
            .ok()
            .and_then(|d| round(d).to_f32())
            .map_or(Value::Float(f), Value::Float),
        Value::BigDecimal(d) => Value::BigDecimal(round(d)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::RoundingMode;

    #[test]
    fn round_value_honours_mode() {
        let half_even = Rounding::new(1, RoundingMode::HalfEven);
        assert_eq!(round_value(Value::Double(0.25), half_even), Value::Double(0.2));
        assert_eq!(
            round_value(Value::Double(0.25), Rounding::half_up(1)),
            Value::Double(0.3)
        );
        assert_eq!(
            round_value(Value::Double(-1.21), Rounding::new(1, RoundingMode::Floor)),
            Value::Double(-1.3)
        );
        assert_eq!(round_value(Value::Long(7), half_even), Value::Long(7));
        assert_eq!(
            round_value(Value::BigInteger(i128::MAX), half_even),
            Value::BigInteger(i128::MAX)
        );
        assert_eq!(
            round_value(Value::Text("0.25".into()), half_even),
            Value::Text("0.25".into())
        );
        assert_eq!(
            round_value(Value::Double(f64::NAN), half_even).column_type(),
            ColumnType::Double
        );
    }

    #[test]
    fn row_range_validation() {
        assert!(row_range(0, 3).is_err());
        assert!(row_range(4, 2).is_err());
        let open = row_range(2, 0).unwrap();
        assert!(!open(1));
        assert!(open(2));
        assert!(open(1_000));
    }

    #[test]
    fn fit_width_pads_and_rejects() {
        let mut short = vec!["a".to_string()];
        fit_width(&mut short, 3).unwrap();
        assert_eq!(short, vec!["a", "", ""]);
        let mut long = vec!["a".to_string(), "b".to_string()];
        assert!(fit_width(&mut long, 1).is_err());
    }

    #[test]
    fn report_into_result() {
        let mut report = StageReport::new("filter");
        assert!(report.clone().into_result().is_ok());
        report.errors.push(RowError {
            row: 2,
            error: ConversionError::new("x", ColumnType::Int, "invalid digit"),
        });
        assert!(matches!(
            report.into_result(),
            Err(GridError::RowErrors {
                operation: "filter",
                count: 1
            })
        ));
    }
}
