//! File opening, input decoding, and dialect parsing helpers.
//!
//! All file handles used by sources, sinks, and the staging arena are opened
//! here. Inputs in encodings other than UTF-8 are decoded on the fly with
//! `encoding_rs_io`; outputs are always written as UTF-8.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::error::{GridError, Result};

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| GridError::InvalidArgument(format!("Unknown encoding '{value}'"))),
        None => Ok(UTF_8),
    }
}

pub fn open_input(path: &Path, encoding: &'static Encoding) -> Result<Box<dyn BufRead>> {
    if is_dash(path) {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file =
        File::open(path).map_err(|err| GridError::io(format!("Opening input file {path:?}"), err))?;
    if encoding == UTF_8 {
        Ok(Box::new(BufReader::new(file)))
    } else {
        let decoder = DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .build(file);
        Ok(Box::new(BufReader::new(decoder)))
    }
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => {
            let file = File::create(p)
                .map_err(|err| GridError::io(format!("Creating output file {p:?}"), err))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(std::io::stdout())),
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => single_ascii(other, "Delimiter"),
    }
}

pub fn parse_quote(value: &str) -> Result<u8, String> {
    match value {
        "double" => Ok(b'"'),
        "single" => Ok(b'\''),
        other => single_ascii(other, "Quote"),
    }
}

fn single_ascii(value: &str, what: &str) -> Result<u8, String> {
    let mut chars = value.chars();
    let first = chars
        .next()
        .ok_or_else(|| format!("{what} cannot be empty"))?;
    if chars.next().is_some() {
        return Err(format!("{what} must be a single character"));
    }
    if !first.is_ascii() {
        return Err(format!("{what} must be ASCII"));
    }
    Ok(first as u8)
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
