use crate::error::{LoadError, Result};
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use csv::{Reader, ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Streams a delimited file as fixed-size record batches of all-Utf8 columns.
///
/// The header row is read eagerly at open time and fixes the column set for
/// the whole file. No type or schema validation happens here: the reader runs
/// in flexible mode, rows shorter than the header are padded with nulls and
/// rows longer than it are truncated. Every batch holds exactly `batch_size`
/// rows except possibly the last.
pub struct CsvBatchReader {
    reader: Reader<File>,
    schema: Arc<Schema>,
    batch_size: usize,
    done: bool,
}

impl CsvBatchReader {
    /// Open `path` and fix the column set from its header row.
    ///
    /// Fails with [`LoadError::SourceNotFound`] when the path does not
    /// resolve to a readable file; callers rely on this firing before any
    /// database connection is opened.
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|_| LoadError::SourceNotFound {
            path: path.to_path_buf(),
        })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let headers = reader.headers()?.clone();
        let fields: Vec<Field> = headers
            .iter()
            .map(|h| Field::new(h, DataType::Utf8, true))
            .collect();

        Ok(CsvBatchReader {
            reader,
            schema: Arc::new(Schema::new(fields)),
            batch_size,
            done: false,
        })
    }

    /// The all-Utf8 schema derived from the header row.
    pub fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    /// Pivot the buffered rows into one column array per header field.
    /// `row.get(idx)` yields `None` past a short row, which becomes a null.
    fn build_batch(&self, rows: &[StringRecord]) -> Result<RecordBatch> {
        let width = self.schema.fields().len();
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(width);
        for idx in 0..width {
            let values: StringArray = rows.iter().map(|row| row.get(idx)).collect();
            columns.push(Arc::new(values));
        }
        RecordBatch::try_new(self.schema.clone(), columns).map_err(LoadError::from)
    }
}

impl Iterator for CsvBatchReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows: Vec<StringRecord> = Vec::with_capacity(self.batch_size);
        let mut record = StringRecord::new();
        while rows.len() < self.batch_size {
            match self.reader.read_record(&mut record) {
                Ok(true) => rows.push(record.clone()),
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }

        if rows.is_empty() {
            return None;
        }
        debug!(rows = rows.len(), "assembled batch");
        Some(self.build_batch(&rows))
    }
}
