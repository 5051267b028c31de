use crate::error::{LoadError, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Float64Builder, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Tokens that mean "no value" wherever a field gets cleaned. Applied
/// uniformly by both the numeric and the location rules.
pub const PLACEHOLDER_TOKENS: [&str; 3] = ["nan", "None", ""];

/// Canonical names of the columns that receive comma-stripping float
/// coercion.
const NUMERIC_COLUMNS: [&str; 3] = ["sales_ratio", "assessed_value", "sale_amount"];

const LOCATION_COLUMN: &str = "location";

/// Canonical form of a raw header: trimmed, lowercased, spaces and hyphens
/// replaced with underscores. Idempotent and defined for any input string.
pub fn canonicalize(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER_TOKENS.contains(&value)
}

fn as_strings<'a>(name: &str, column: &'a ArrayRef) -> Result<&'a StringArray> {
    column.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
        LoadError::Batch(ArrowError::CastError(format!(
            "column `{}` expected utf8, got {:?}",
            name,
            column.data_type()
        )))
    })
}

/// Returns a new batch with canonical column names and the known messy
/// fields repaired. Columns matching no rule pass through unchanged; the
/// input batch is never mutated.
///
/// Name collisions after canonicalization are not guarded against; duplicate
/// names are carried through in input order.
pub fn clean_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut fields: Vec<Field> = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        let name = canonicalize(field.name());
        if NUMERIC_COLUMNS.contains(&name.as_str()) {
            let parsed = parse_numeric_column(&name, as_strings(&name, column)?)?;
            fields.push(Field::new(&name, DataType::Float64, true));
            columns.push(Arc::new(parsed));
        } else if name == LOCATION_COLUMN {
            let cleaned = clean_location_column(as_strings(&name, column)?);
            fields.push(Field::new(&name, DataType::Utf8, true));
            columns.push(Arc::new(cleaned));
        } else {
            fields.push(Field::new(&name, field.data_type().clone(), field.is_nullable()));
            columns.push(column.clone());
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(LoadError::from)
}

/// Strip thousands separators and coerce to f64. Placeholder tokens become
/// nulls; the check runs before parsing so the literal "nan" never turns
/// into a float NaN.
fn parse_numeric_column(name: &str, values: &StringArray) -> Result<Float64Array> {
    let mut builder = Float64Builder::with_capacity(values.len());
    for idx in 0..values.len() {
        if values.is_null(idx) {
            builder.append_null();
            continue;
        }
        let raw = values.value(idx).trim();
        let stripped = raw.replace(',', "");
        if is_placeholder(stripped.as_str()) {
            builder.append_null();
            continue;
        }
        match stripped.parse::<f64>() {
            Ok(v) => builder.append_value(v),
            Err(_) => {
                return Err(LoadError::NumericParse {
                    column: name.to_string(),
                    value: raw.to_string(),
                })
            }
        }
    }
    Ok(builder.finish())
}

/// Reduce a `POINT (<coords>)` literal to bare coordinates, trimmed.
/// Placeholder tokens become nulls.
fn clean_location_column(values: &StringArray) -> StringArray {
    let mut builder = StringBuilder::with_capacity(values.len(), values.len() * 16);
    for idx in 0..values.len() {
        if values.is_null(idx) {
            builder.append_null();
            continue;
        }
        let stripped = values
            .value(idx)
            .replace("POINT ", "")
            .replace(['(', ')'], "");
        let trimmed = stripped.trim();
        if is_placeholder(trimmed) {
            builder.append_null();
        } else {
            builder.append_value(trimmed);
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_batch(cols: Vec<(&str, Vec<Option<&str>>)>) -> RecordBatch {
        let fields: Vec<Field> = cols
            .iter()
            .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
            .collect();
        let arrays: Vec<ArrayRef> = cols
            .into_iter()
            .map(|(_, values)| Arc::new(StringArray::from(values)) as ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    fn floats<'a>(batch: &'a RecordBatch, idx: usize) -> &'a Float64Array {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
    }

    fn strings<'a>(batch: &'a RecordBatch, idx: usize) -> &'a StringArray {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for raw in [" Sale Amount ", "Assessed-Value", "already_canonical", "", "  -  "] {
            let once = canonicalize(raw);
            assert_eq!(canonicalize(&once), once);
        }
    }

    #[test]
    fn canonicalize_lowers_and_underscores() {
        assert_eq!(canonicalize(" Sale Amount "), "sale_amount");
        assert_eq!(canonicalize("Non-Use Code"), "non_use_code");
        assert_eq!(canonicalize("TOWN"), "town");
    }

    #[test]
    fn numeric_column_strips_commas() {
        let batch = utf8_batch(vec![("Sale Amount", vec![Some("1,234.50"), Some("99")])]);
        let cleaned = clean_batch(&batch).unwrap();
        assert_eq!(cleaned.schema().field(0).name(), "sale_amount");
        assert_eq!(cleaned.schema().field(0).data_type(), &DataType::Float64);
        assert_eq!(floats(&cleaned, 0).value(0), 1234.50);
        assert_eq!(floats(&cleaned, 0).value(1), 99.0);
    }

    #[test]
    fn numeric_placeholders_become_null_not_nan() {
        let batch = utf8_batch(vec![(
            "sales_ratio",
            vec![Some("nan"), Some("None"), Some(""), Some("0.5")],
        )]);
        let cleaned = clean_batch(&batch).unwrap();
        let col = floats(&cleaned, 0);
        assert!(col.is_null(0));
        assert!(col.is_null(1));
        assert!(col.is_null(2));
        assert_eq!(col.value(3), 0.5);
    }

    #[test]
    fn numeric_junk_aborts_the_batch() {
        let batch = utf8_batch(vec![("assessed_value", vec![Some("12x")])]);
        let err = clean_batch(&batch).err().unwrap();
        match err {
            LoadError::NumericParse { column, value } => {
                assert_eq!(column, "assessed_value");
                assert_eq!(value, "12x");
            }
            other => panic!("expected NumericParse, got {:?}", other),
        }
    }

    #[test]
    fn location_drops_point_wrapper() {
        let batch = utf8_batch(vec![(
            "Location",
            vec![Some("POINT (41.2 -72.9)"), Some("nan"), Some("None"), Some("")],
        )]);
        let cleaned = clean_batch(&batch).unwrap();
        assert_eq!(cleaned.schema().field(0).name(), "location");
        let col = strings(&cleaned, 0);
        assert_eq!(col.value(0), "41.2 -72.9");
        assert!(col.is_null(1));
        assert!(col.is_null(2));
        assert!(col.is_null(3));
    }

    #[test]
    fn unmatched_columns_pass_through() {
        let batch = utf8_batch(vec![
            ("Town", vec![Some("Hartford"), None]),
            ("Sale Amount", vec![Some("1"), Some("2")]),
        ]);
        let cleaned = clean_batch(&batch).unwrap();
        assert_eq!(cleaned.schema().field(0).name(), "town");
        let col = strings(&cleaned, 0);
        assert_eq!(col.value(0), "Hartford");
        assert!(col.is_null(1));
    }

    #[test]
    fn input_batch_is_untouched() {
        let batch = utf8_batch(vec![("Sale Amount", vec![Some("1,000")])]);
        let _ = clean_batch(&batch).unwrap();
        assert_eq!(batch.schema().field(0).name(), "Sale Amount");
        assert_eq!(strings(&batch, 0).value(0), "1,000");
    }
}
