//! Record streaming from census datasets.
//!
//! This module turns a dataset source (flat file, or a CSV entry inside a
//! census archive) into a lazy stream of projected `Record`s.
//!
//! Design goals:
//! - **Stream, never materialize**: microdata files run to tens of millions
//!   of rows, so records are decoded one at a time.
//! - **Projection narrowing at load time**: only projected columns are
//!   materialized per row, bounding per-row memory.
//! - **Row-level error collection**: malformed rows are reported, not fatal;
//!   rows with missing key values are still yielded (consumer policy).
//! - **Single pass**: a stream is finite and not restartable once consumed.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::ByteRecord;
use encoding_rs::Encoding;
use zip::ZipArchive;

use crate::domain::{ColumnProjection, Record, RecordSchema};
use crate::error::{PipelineError, Result};
use crate::io::sniff::{self, SAMPLE_LEN, SniffResult};

/// Where a dataset-year's records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    /// A flat delimited text file on disk.
    Csv(PathBuf),
    /// A delimited text entry inside a zip archive, read without
    /// pre-extraction.
    ZipEntry { archive: PathBuf, entry: String },
}

impl DatasetSource {
    pub fn describe(&self) -> String {
        match self {
            DatasetSource::Csv(path) => path.display().to_string(),
            DatasetSource::ZipEntry { archive, entry } => {
                format!("{}!{entry}", archive.display())
            }
        }
    }
}

/// A row-level problem encountered while streaming.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

/// Lazy, single-pass stream of projected records.
///
/// Iteration yields `Record`s aligned with [`RecordStream::schema`]; parse
/// failures are collected into [`RecordStream::row_errors`] and iteration
/// continues with the next row.
pub struct RecordStream<'r> {
    reader: csv::Reader<&'r mut dyn Read>,
    encoding: &'static Encoding,
    schema: RecordSchema,
    /// Physical column index per schema slot; `None` when the projected
    /// header is absent from this file.
    slots: Vec<Option<usize>>,
    raw: ByteRecord,
    line: u64,
    rows_read: usize,
    row_errors: Vec<RowError>,
}

impl<'r> RecordStream<'r> {
    fn new(
        reader: &'r mut dyn Read,
        format: SniffResult,
        projection: &ColumnProjection,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| decode_header(format.encoding, h))
            .collect();

        let mut fields = Vec::with_capacity(projection.len());
        let mut slots = Vec::with_capacity(projection.len());
        for (logical, physical) in projection.iter() {
            fields.push(logical.to_string());
            slots.push(headers.iter().position(|h| h == physical));
        }

        Ok(Self {
            reader,
            encoding: format.encoding,
            schema: RecordSchema::new(fields),
            slots,
            raw: ByteRecord::new(),
            line: 1,
            rows_read: 0,
            row_errors: Vec::new(),
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn row_errors(&self) -> &[RowError] {
        &self.row_errors
    }

    pub fn take_row_errors(&mut self) -> Vec<RowError> {
        std::mem::take(&mut self.row_errors)
    }
}

impl Iterator for RecordStream<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            self.line += 1;
            match self.reader.read_byte_record(&mut self.raw) {
                Ok(true) => {
                    self.rows_read += 1;
                    let values = self
                        .slots
                        .iter()
                        .map(|slot| {
                            slot.and_then(|idx| self.raw.get(idx))
                                .map(|raw| sniff::decode(self.encoding, raw).into_owned())
                        })
                        .collect();
                    return Some(Record::new(values));
                }
                Ok(false) => return None,
                Err(e) => {
                    let is_io = matches!(e.kind(), csv::ErrorKind::Io(_));
                    self.row_errors.push(RowError {
                        line: self.line,
                        message: format!("CSV parse error: {e}"),
                    });
                    // An I/O failure mid-stream will not heal on retry; stop
                    // instead of erroring on every subsequent row.
                    if is_io {
                        return None;
                    }
                }
            }
        }
    }
}

/// Open the source, sniff its format, and hand a live [`RecordStream`] to
/// `f`.
///
/// The stream borrows the underlying file/archive handle, so consumption has
/// to happen inside the closure; this is also what makes the single-pass
/// contract hard to violate.
pub fn with_record_stream<T>(
    source: &DatasetSource,
    projection: &ColumnProjection,
    f: impl FnOnce(&mut RecordStream<'_>) -> T,
) -> Result<T> {
    let format = sniff::sniff(&read_sample(source)?);
    with_reader(source, |reader| -> Result<T> {
        let mut stream = RecordStream::new(reader, format, projection)?;
        Ok(f(&mut stream))
    })?
}

/// Sniff the source and read its decoded header row.
pub fn read_headers(source: &DatasetSource) -> Result<(SniffResult, Vec<String>)> {
    let format = sniff::sniff(&read_sample(source)?);
    let headers = with_reader(source, |reader| -> Result<Vec<String>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter)
            .flexible(true)
            .from_reader(reader);
        Ok(csv_reader
            .byte_headers()?
            .iter()
            .map(|h| decode_header(format.encoding, h))
            .collect())
    })??;
    Ok((format, headers))
}

/// Read the sniffer's byte sample from the start of the source.
pub fn read_sample(source: &DatasetSource) -> Result<Vec<u8>> {
    with_reader(source, |reader| {
        let mut sample = vec![0u8; SAMPLE_LEN];
        let mut filled = 0;
        loop {
            match reader.read(&mut sample[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == sample.len() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        sample.truncate(filled);
        sample
    })
}

/// Find the main microdata CSV entry inside a census archive.
///
/// Archives carry supplements and dictionaries next to the main file, so
/// entries matching `filter` win; otherwise the first CSV entry is used.
pub fn find_csv_entry(archive: &Path, filter: &str) -> Result<String> {
    let names = entry_names(archive)?;
    let csvs: Vec<&String> = names
        .iter()
        .filter(|n| n.to_lowercase().ends_with(".csv"))
        .collect();

    let filter_lc = filter.to_lowercase();
    if let Some(hit) = csvs.iter().find(|n| n.to_lowercase().contains(&filter_lc)) {
        return Ok((*hit).clone());
    }
    csvs.first()
        .map(|n| (*n).clone())
        .ok_or_else(|| PipelineError::MissingEntry {
            path: archive.to_path_buf(),
            filter: filter.to_string(),
        })
}

/// Find the dictionary workbook entry inside a census archive, if any.
pub fn find_dictionary_entry(archive: &Path, filter: &str) -> Result<Option<String>> {
    let names = entry_names(archive)?;
    let filter_lc = filter.to_lowercase();
    Ok(names
        .iter()
        .find(|n| {
            let lc = n.to_lowercase();
            lc.ends_with(".xlsx") && lc.contains(&filter_lc)
        })
        .cloned())
}

/// Read one archive entry fully into memory.
///
/// Only used for the dictionary workbook, which is small; microdata entries
/// go through [`with_record_stream`] instead.
pub fn read_entry_bytes(archive: &Path, entry: &str) -> Result<Vec<u8>> {
    let file = File::open(archive).map_err(|e| PipelineError::io(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
    let mut entry_file = zip.by_name(entry).map_err(|e| archive_error(archive, e))?;
    let mut bytes = Vec::new();
    entry_file
        .read_to_end(&mut bytes)
        .map_err(|e| PipelineError::io(archive, e))?;
    Ok(bytes)
}

fn entry_names(archive: &Path) -> Result<Vec<String>> {
    let file = File::open(archive).map_err(|e| PipelineError::io(archive, e))?;
    let zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
    Ok(zip.file_names().map(str::to_string).collect())
}

fn with_reader<T>(source: &DatasetSource, f: impl FnOnce(&mut dyn Read) -> T) -> Result<T> {
    match source {
        DatasetSource::Csv(path) => {
            let mut file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
            Ok(f(&mut file))
        }
        DatasetSource::ZipEntry { archive, entry } => {
            let file = File::open(archive).map_err(|e| PipelineError::io(archive, e))?;
            let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
            let mut entry_file = zip.by_name(entry).map_err(|e| archive_error(archive, e))?;
            Ok(f(&mut entry_file))
        }
    }
}

fn archive_error(path: &Path, e: zip::result::ZipError) -> PipelineError {
    PipelineError::Archive {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn decode_header(encoding: &'static Encoding, raw: &[u8]) -> String {
    // Spreadsheet tools sometimes emit a BOM prefix on the first header; if we
    // don't strip it, schema resolution reports the column as missing.
    sniff::decode(encoding, raw)
        .trim()
        .trim_start_matches('\u{feff}')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn projection(pairs: &[(&str, &str)]) -> ColumnProjection {
        let mut p = ColumnProjection::default();
        for (logical, physical) in pairs {
            p.insert(logical, *physical);
        }
        p
    }

    fn write_latin1_csv(dir: &Path) -> PathBuf {
        let path = dir.join("microdados_ed_basica_2021.csv");
        let mut file = File::create(&path).unwrap();
        // "SÃO PAULO" in Latin-1 (0xC3 = Ã); semicolon-delimited.
        file.write_all(b"NU_ANO_CENSO;NO_MUN;QT_MAT_ESP\n").unwrap();
        file.write_all(b"2021;S\xC3O PAULO;5\n").unwrap();
        file.write_all(b"2021;OSASCO\n").unwrap();
        path
    }

    #[test]
    fn streams_projected_latin1_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_latin1_csv(dir.path());
        let source = DatasetSource::Csv(path);

        let (format, headers) = read_headers(&source).unwrap();
        assert_eq!(format.delimiter, b';');
        assert_eq!(headers, vec!["NU_ANO_CENSO", "NO_MUN", "QT_MAT_ESP"]);

        let projection = projection(&[
            ("NU_ANO_CENSO", "NU_ANO_CENSO"),
            ("NO_MUN", "NO_MUN"),
            ("QT_MAT_ESP", "QT_MAT_ESP"),
        ]);

        let records: Vec<Record> = with_record_stream(&source, &projection, |stream| {
            assert_eq!(stream.schema().fields().len(), 3);
            stream.collect()
        })
        .unwrap();

        assert_eq!(records.len(), 2);
        let schema = RecordSchema::new(vec![
            "NU_ANO_CENSO".to_string(),
            "NO_MUN".to_string(),
            "QT_MAT_ESP".to_string(),
        ]);
        assert_eq!(records[0].get(&schema, "NO_MUN"), Some("SÃO PAULO"));
        // The short row is still yielded; its missing metric is None.
        assert_eq!(records[1].get(&schema, "NO_MUN"), Some("OSASCO"));
        assert_eq!(records[1].get(&schema, "QT_MAT_ESP"), None);
    }

    #[test]
    fn absent_projected_column_yields_none_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_latin1_csv(dir.path());
        let source = DatasetSource::Csv(path);

        let projection = projection(&[
            ("NU_ANO_CENSO", "NU_ANO_CENSO"),
            ("QT_MAT_FUND", "QT_MAT_FUND"),
        ]);

        let records: Vec<Record> =
            with_record_stream(&source, &projection, |stream| stream.collect()).unwrap();
        let schema = RecordSchema::new(vec![
            "NU_ANO_CENSO".to_string(),
            "QT_MAT_FUND".to_string(),
        ]);
        assert_eq!(records[0].get(&schema, "NU_ANO_CENSO"), Some("2021"));
        assert_eq!(records[0].get(&schema, "QT_MAT_FUND"), None);
    }

    fn write_archive(dir: &Path) -> PathBuf {
        let path = dir.join("microdados_censo_escolar_2023.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        writer
            .start_file("dados/suplemento_cursos_tecnicos_2023.csv", options)
            .unwrap();
        writer.write_all(b"a;b\n1;2\n").unwrap();

        writer
            .start_file("dados/microdados_ed_basica_2023.csv", options)
            .unwrap();
        writer
            .write_all(b"NU_ANO_CENSO;QT_MAT_ESP\n2023;7\n2023;3\n")
            .unwrap();

        writer.finish().unwrap();
        path
    }

    #[test]
    fn archive_entry_selection_prefers_the_filter_match() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path());

        let entry = find_csv_entry(&archive, "microdados_ed_basica").unwrap();
        assert_eq!(entry, "dados/microdados_ed_basica_2023.csv");

        // Filter miss falls back to the first CSV entry instead of failing.
        let fallback = find_csv_entry(&archive, "does_not_exist").unwrap();
        assert!(fallback.ends_with(".csv"));
    }

    #[test]
    fn streams_records_from_inside_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path());
        let entry = find_csv_entry(&archive, "microdados_ed_basica").unwrap();
        let source = DatasetSource::ZipEntry { archive, entry };

        let projection = projection(&[
            ("NU_ANO_CENSO", "NU_ANO_CENSO"),
            ("QT_MAT_ESP", "QT_MAT_ESP"),
        ]);
        let (rows, errors) = with_record_stream(&source, &projection, |stream| {
            let rows: Vec<Record> = stream.by_ref().collect();
            (rows, stream.row_errors().len())
        })
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(errors, 0);
    }

    #[test]
    fn missing_file_is_a_tagged_io_error() {
        let source = DatasetSource::Csv(PathBuf::from("/nonexistent/censo.csv"));
        let err = read_headers(&source).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
