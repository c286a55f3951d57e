#![cfg(feature = "excel")]

//! XLSX ingestion.
//!
//! Only the first worksheet is read. Its cells are rendered as text and re-encoded as CSV so the
//! rest of the pipeline sees the same record stream it gets from a CSV file.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{Data, Reader, Sheets, open_workbook_auto, open_workbook_auto_from_rs};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{FileOptions, FileType};

use super::format::{FormatReader, Input, RowStream};
use super::headers::header_from_first_record;

/// Text rows of the first sheet of a workbook on disk.
pub fn read_xlsx_rows_from_path(path: impl AsRef<Path>) -> IngestionResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)?;
    first_sheet_rows(&mut workbook)
}

/// Text rows of the first sheet of an in-memory workbook.
pub fn read_xlsx_rows_from_bytes(data: Vec<u8>) -> IngestionResult<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data))?;
    first_sheet_rows(&mut workbook)
}

fn first_sheet_rows<RS: Read + Seek>(workbook: &mut Sheets<RS>) -> IngestionResult<Vec<Vec<String>>> {
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(IngestionError::format("workbook has no sheets"));
    };
    let range = workbook.worksheet_range(&sheet)?;
    Ok(range
        .rows()
        .filter_map(|row| {
            let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
            // Rows are as wide as the used range; drop the padding past the last real cell.
            while cells.last().is_some_and(|c| c.is_empty()) {
                cells.pop();
            }
            // Blank rows vanish from the re-encoded CSV, so they are not counted either.
            (!cells.is_empty()).then_some(cells)
        })
        .collect())
}

fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}

/// Re-encode rows as CSV text.
///
/// A field is quoted when it contains `,`, `"` or a newline; embedded quotes are doubled.
/// Every record ends with `\n`.
pub fn encode_rows_as_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            if cell.contains([',', '"', '\n']) {
                out.push('"');
                out.push_str(&cell.replace('"', "\"\""));
                out.push('"');
            } else {
                out.push_str(cell);
            }
        }
        out.push('\n');
    }
    out
}

/// XLSX strategy for [`FormatReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxFormat;

impl XlsxFormat {
    fn rows(&self, input: &Input) -> IngestionResult<Vec<Vec<String>>> {
        match input {
            Input::Path(p) => read_xlsx_rows_from_path(p),
            Input::Bytes(b) => read_xlsx_rows_from_bytes(b.clone()),
        }
    }
}

impl FormatReader for XlsxFormat {
    fn file_type(&self) -> FileType {
        FileType::Xlsx
    }

    fn read_header(&self, input: &Input, options: &FileOptions) -> IngestionResult<Vec<String>> {
        let rows = self.rows(input)?;
        let first = rows
            .first()
            .ok_or_else(|| IngestionError::format("no rows found in first sheet"))?;
        Ok(header_from_first_record(first, options.no_header_row))
    }

    fn row_count(&self, input: &Input, options: &FileOptions) -> IngestionResult<usize> {
        let total = self.rows(input)?.len();
        if options.no_header_row {
            Ok(total)
        } else {
            Ok(total.saturating_sub(1))
        }
    }

    fn open(&self, input: Input, _options: &FileOptions) -> IngestionResult<RowStream> {
        let rows = match input {
            Input::Path(p) => read_xlsx_rows_from_path(p)?,
            Input::Bytes(b) => read_xlsx_rows_from_bytes(b)?,
        };
        if rows.is_empty() {
            return Err(IngestionError::format("no rows found in first sheet"));
        }
        Ok(RowStream::from_csv_bytes(encode_rows_as_csv(&rows).into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_encoding_quotes_only_when_needed() {
        let rows = vec![
            vec!["plain".to_string(), "a,b".to_string()],
            vec!["say \"hi\"".to_string(), "line\nbreak".to_string()],
        ];
        assert_eq!(
            encode_rows_as_csv(&rows),
            "plain,\"a,b\"\n\"say \"\"hi\"\"\",\"line\nbreak\"\n"
        );
    }

    #[test]
    fn encoded_rows_parse_back_identically() {
        let rows = vec![vec!["x,y".to_string(), "\"q\"".to_string(), String::new()]];
        let mut stream = RowStream::from_csv_bytes(encode_rows_as_csv(&rows).into_bytes());
        assert_eq!(stream.next().unwrap().unwrap(), rows[0]);
    }

    #[test]
    fn whole_floats_render_without_fraction() {
        assert_eq!(cell_to_string(&Data::Float(3.0)), "3");
        assert_eq!(cell_to_string(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
