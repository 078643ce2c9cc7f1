//! Row codec: one logical line of delimited text to fields and back.
//!
//! Decoding is strict about quoting: a quoted field must be closed before the
//! line ends, otherwise [`FormatError::Unterminated`] is returned so that line
//! readers can join the next physical line and retry. Encoding goes through
//! `csv::Writer` with minimal quoting, so fields are only wrapped when they
//! contain the delimiter, the quote character, or a line break.

use std::io;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, GridError};

pub type Row = Vec<String>;

pub const DEFAULT_DELIMITER: u8 = b',';
pub const DEFAULT_QUOTE: u8 = b'"';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCodec {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for RowCodec {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quote: DEFAULT_QUOTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

impl RowCodec {
    pub fn new(delimiter: u8, quote: u8) -> Self {
        Self { delimiter, quote }
    }

    pub fn decode(&self, line: &str) -> Result<Row, FormatError> {
        let delimiter = char::from(self.delimiter);
        let quote = char::from(self.quote);
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut state = State::FieldStart;

        for ch in line.chars() {
            state = match state {
                State::FieldStart if ch == quote => State::Quoted,
                State::FieldStart | State::Unquoted if ch == delimiter => {
                    fields.push(std::mem::take(&mut field));
                    State::FieldStart
                }
                State::FieldStart | State::Unquoted => {
                    field.push(ch);
                    State::Unquoted
                }
                State::Quoted if ch == quote => State::QuoteInQuoted,
                State::Quoted => {
                    field.push(ch);
                    State::Quoted
                }
                State::QuoteInQuoted if ch == quote => {
                    field.push(quote);
                    State::Quoted
                }
                State::QuoteInQuoted if ch == delimiter => {
                    fields.push(std::mem::take(&mut field));
                    State::FieldStart
                }
                // Text trailing a closing quote is kept literally.
                State::QuoteInQuoted => {
                    field.push(ch);
                    State::Unquoted
                }
            };
        }

        if state == State::Quoted {
            return Err(FormatError::Unterminated {
                field: fields.len() + 1,
            });
        }
        fields.push(field);
        Ok(fields)
    }

    /// Encodes one row as a line without its terminator.
    pub fn encode(&self, row: &[String]) -> Result<String, GridError> {
        let mut writer = self.writer(Vec::new());
        writer
            .write_record(row)
            .map_err(|err| GridError::io("Encoding row", err.into()))?;
        let bytes = writer
            .into_inner()
            .map_err(|err| GridError::io("Flushing encoded row", err.into_error()))?;
        let mut line = String::from_utf8(bytes).map_err(|err| {
            GridError::io("Encoding row", io::Error::new(io::ErrorKind::InvalidData, err))
        })?;
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(line)
    }

    /// A `csv::Writer` configured for this dialect.
    pub fn writer<W: std::io::Write>(&self, inner: W) -> csv::Writer<W> {
        WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .quote_style(QuoteStyle::Necessary)
            .double_quote(true)
            .flexible(true)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decode_handles_quoted_delimiters_and_escapes() {
        let codec = RowCodec::default();
        assert_eq!(
            codec.decode(r#"1,"Smith, J","say ""hi""",x"#).unwrap(),
            row(&["1", "Smith, J", r#"say "hi""#, "x"])
        );
        assert_eq!(codec.decode("a,,").unwrap(), row(&["a", "", ""]));
        assert_eq!(codec.decode("").unwrap(), row(&[""]));
    }

    #[test]
    fn decode_reports_unterminated_quote() {
        let codec = RowCodec::default();
        assert_eq!(
            codec.decode(r#"1,"open"#).unwrap_err(),
            FormatError::Unterminated { field: 2 }
        );
    }

    #[test]
    fn encode_quotes_only_when_needed() {
        let codec = RowCodec::default();
        assert_eq!(
            codec.encode(&row(&["plain", "a,b", "q\"t"])).unwrap(),
            r#"plain,"a,b","q""t""#
        );
        assert_eq!(codec.encode(&row(&["", ""])).unwrap(), ",");
    }

    #[test]
    fn custom_dialect_round_trips() {
        let codec = RowCodec::new(b';', b'\'');
        let original = row(&["it's", "a;b", "c"]);
        let line = codec.encode(&original).unwrap();
        assert_eq!(line, "'it''s';'a;b';c");
        assert_eq!(codec.decode(&line).unwrap(), original);
    }
}
