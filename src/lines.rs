//! Line sources and sinks: where rows come from and where they go.
//!
//! Every adapter owns its handle in an `Option` so that [`LineSource::close`]
//! and [`LineSink::close`] release it exactly once; dropping an adapter
//! releases whatever is still open.

use std::{
    io::{BufRead, BufReader, Cursor, Write},
    path::Path,
};

use encoding_rs::Encoding;
use log::debug;

use crate::{
    codec::{Row, RowCodec},
    error::{FormatError, GridError, Result},
    io_utils,
};

pub trait LineSource {
    /// Next row, or `None` once the data is exhausted.
    fn read_row(&mut self) -> Result<Option<Row>>;

    /// Releases the underlying handle. Further reads report end of data.
    fn close(&mut self);
}

pub trait LineSink {
    fn write_row(&mut self, row: &[String]) -> Result<()>;

    /// Flushes and releases the underlying handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

impl<S: LineSource + ?Sized> LineSource for &mut S {
    fn read_row(&mut self) -> Result<Option<Row>> {
        (**self).read_row()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<S: LineSink + ?Sized> LineSink for &mut S {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        (**self).write_row(row)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Reads rows from any buffered reader, joining physical lines while a
/// quoted field is still open.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: Option<R>,
    codec: RowCodec,
    line_number: usize,
    buffer: String,
}

pub type FileSource = ReaderSource<Box<dyn BufRead>>;
pub type TextSource = ReaderSource<Cursor<String>>;
pub type RemoteSource = ReaderSource<BufReader<reqwest::blocking::Response>>;

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R, codec: RowCodec) -> Self {
        Self {
            reader: Some(reader),
            codec,
            line_number: 0,
            buffer: String::new(),
        }
    }

    /// Number of physical lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Next physical line, terminator included.
    fn next_line(&mut self) -> Result<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        self.buffer.clear();
        let read = reader
            .read_line(&mut self.buffer)
            .map_err(|err| GridError::io(format!("Reading line {}", self.line_number + 1), err))?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(std::mem::take(&mut self.buffer)))
    }
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

impl FileSource {
    pub fn open(path: &Path, codec: RowCodec, encoding: &'static Encoding) -> Result<Self> {
        let reader = io_utils::open_input(path, encoding)?;
        debug!("Opened file source {path:?} ({})", encoding.name());
        Ok(ReaderSource::new(reader, codec))
    }
}

impl TextSource {
    pub fn from_text(text: impl Into<String>, codec: RowCodec) -> Self {
        ReaderSource::new(Cursor::new(text.into()), codec)
    }
}

impl RemoteSource {
    /// Issues an HTTP GET and streams the response body.
    pub fn get(url: &str, codec: RowCodec) -> Result<Self> {
        let remote_error = |source| GridError::Remote {
            url: url.to_string(),
            source,
        };
        let response = reqwest::blocking::get(url)
            .and_then(|response| response.error_for_status())
            .map_err(remote_error)?;
        debug!("Streaming remote source {url} ({})", response.status());
        Ok(ReaderSource::new(BufReader::new(response), codec))
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn read_row(&mut self) -> Result<Option<Row>> {
        // (text so far, first line number, field left open)
        let mut pending: Option<(String, usize, usize)> = None;
        loop {
            let Some(line) = self.next_line()? else {
                return match pending {
                    Some((_, line, field)) => Err(GridError::Format {
                        line,
                        source: FormatError::Unterminated { field },
                    }),
                    None => Ok(None),
                };
            };
            let (text, start) = match pending.take() {
                Some((mut text, start, _)) => {
                    text.push_str(&line);
                    (text, start)
                }
                None if strip_terminator(&line).is_empty() => continue,
                None => (line, self.line_number),
            };
            match self.codec.decode(strip_terminator(&text)) {
                Ok(row) => return Ok(Some(row)),
                Err(FormatError::Unterminated { field }) => pending = Some((text, start, field)),
            }
        }
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("Closed reader source after {} line(s)", self.line_number);
        }
    }
}

/// Rows held in memory.
#[derive(Debug, Default)]
pub struct ListSource {
    rows: Option<std::vec::IntoIter<Row>>,
}

impl ListSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Some(rows.into_iter()),
        }
    }
}

impl LineSource for ListSource {
    fn read_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) {
        self.rows = None;
    }
}

/// Writes rows through a `csv::Writer` into any byte sink.
pub struct WriterSink<W: Write> {
    writer: Option<csv::Writer<W>>,
    rows_written: usize,
}

pub type FileSink = WriterSink<Box<dyn Write>>;

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W, codec: RowCodec) -> Self {
        Self {
            writer: Some(codec.writer(inner)),
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flushes and hands back the inner writer.
    pub fn into_inner(mut self) -> Result<Option<W>> {
        match self.writer.take() {
            Some(writer) => writer
                .into_inner()
                .map(Some)
                .map_err(|err| GridError::io("Flushing row writer", err.into_error())),
            None => Ok(None),
        }
    }
}

impl FileSink {
    pub fn create(path: &Path, codec: RowCodec) -> Result<Self> {
        let writer = io_utils::open_output(Some(path))?;
        Ok(WriterSink::new(writer, codec))
    }

    /// Rows written to standard output.
    pub fn stdout(codec: RowCodec) -> Self {
        WriterSink::new(Box::new(std::io::stdout()), codec)
    }
}

impl<W: Write> LineSink for WriterSink<W> {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| GridError::io("Writing row", std::io::ErrorKind::BrokenPipe.into()))?;
        writer
            .write_record(row)
            .map_err(|err| GridError::io("Writing row", err.into()))?;
        self.rows_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|err| GridError::io("Flushing row writer", err))?;
        }
        Ok(())
    }
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct ListSink {
    rows: Vec<Row>,
    closed: bool,
}

impl ListSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl LineSink for ListSink {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        if self.closed {
            return Err(GridError::io(
                "Writing row to closed list sink",
                std::io::ErrorKind::BrokenPipe.into(),
            ));
        }
        self.rows.push(row.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Renders rows into a single string using the codec's dialect.
pub struct StringSink {
    sink: WriterSink<Vec<u8>>,
    text: String,
}

impl StringSink {
    pub fn new(codec: RowCodec) -> Self {
        Self {
            sink: WriterSink::new(Vec::new(), codec),
            text: String::new(),
        }
    }

    /// Text written so far; complete once the sink is closed.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(mut self) -> Result<String> {
        self.close()?;
        Ok(self.text)
    }
}

impl LineSink for StringSink {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.sink.write_row(row)
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.sink.writer.take() else {
            return Ok(());
        };
        let bytes = writer
            .into_inner()
            .map_err(|err| GridError::io("Flushing string sink", err.into_error()))?;
        self.text = String::from_utf8(bytes).map_err(|err| {
            GridError::io(
                "Decoding string sink",
                std::io::Error::new(std::io::ErrorKind::InvalidData, err),
            )
        })?;
        Ok(())
    }
}

/// Streams every row of `source` into `sink`, closing both on every path.
pub fn copy_rows(source: &mut dyn LineSource, sink: &mut dyn LineSink) -> Result<usize> {
    let result: Result<usize> = (|| {
        let mut copied = 0usize;
        while let Some(row) = source.read_row()? {
            sink.write_row(&row)?;
            copied += 1;
        }
        Ok(copied)
    })();
    source.close();
    let closed = sink.close();
    let copied = result?;
    closed?;
    Ok(copied)
}
