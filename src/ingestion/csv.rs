//! CSV ingestion.
//!
//! Rules:
//!
//! - Records may have differing widths (`flexible`); short rows are not padded here.
//! - Cells are decoded lossily, so a stray non-UTF-8 byte never drops a row.
//! - The first record is the header unless `no_header_row` is set.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{FileOptions, FileType};

use super::format::{FormatReader, Input, RowStream};
use super::headers::header_from_first_record;

/// Reader configuration shared by every CSV consumer in the crate.
pub(crate) fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder
}

pub(crate) fn record_to_strings(record: &csv::ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

/// Header of a CSV byte source.
pub fn read_header_from_reader<R: Read>(reader: R, options: &FileOptions) -> IngestionResult<Vec<String>> {
    let mut rdr = reader_builder().from_reader(reader);
    let mut record = csv::ByteRecord::new();
    if !rdr.read_byte_record(&mut record)? {
        return Err(IngestionError::format("CSV input is empty"));
    }
    Ok(header_from_first_record(&record_to_strings(&record), options.no_header_row))
}

/// Number of data rows in a CSV byte source.
///
/// Undecodable records are still counted so the count matches what a tolerant reader skips over.
pub fn count_rows_from_reader<R: Read>(reader: R, options: &FileOptions) -> IngestionResult<usize> {
    let mut rdr = reader_builder().from_reader(reader);
    let mut record = csv::ByteRecord::new();
    let mut total = 0usize;
    loop {
        match rdr.read_byte_record(&mut record) {
            Ok(true) => total += 1,
            Ok(false) => break,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                tracing::debug!(error = %err, "counting undecodable CSV record");
                total += 1;
            }
        }
    }
    if options.no_header_row {
        Ok(total)
    } else {
        Ok(total.saturating_sub(1))
    }
}

/// Header of a CSV file on disk.
pub fn read_csv_header(path: impl AsRef<Path>, options: &FileOptions) -> IngestionResult<Vec<String>> {
    read_header_from_reader(BufReader::new(File::open(path)?), options)
}

/// Data row count of a CSV file on disk.
pub fn count_csv_rows(path: impl AsRef<Path>, options: &FileOptions) -> IngestionResult<usize> {
    count_rows_from_reader(BufReader::new(File::open(path)?), options)
}

/// CSV strategy for [`FormatReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFormat;

impl FormatReader for CsvFormat {
    fn file_type(&self) -> FileType {
        FileType::Csv
    }

    fn read_header(&self, input: &Input, options: &FileOptions) -> IngestionResult<Vec<String>> {
        match input {
            Input::Path(p) => read_csv_header(p, options),
            Input::Bytes(b) => read_header_from_reader(b.as_slice(), options),
        }
    }

    fn row_count(&self, input: &Input, options: &FileOptions) -> IngestionResult<usize> {
        match input {
            Input::Path(p) => count_csv_rows(p, options),
            Input::Bytes(b) => count_rows_from_reader(b.as_slice(), options),
        }
    }

    fn open(&self, input: Input, _options: &FileOptions) -> IngestionResult<RowStream> {
        Ok(match input {
            Input::Path(p) => RowStream::from_csv_reader(BufReader::new(File::open(p)?)),
            Input::Bytes(b) => RowStream::from_csv_reader(Cursor::new(b)),
        })
    }
}
