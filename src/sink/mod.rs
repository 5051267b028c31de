use crate::error::{LoadError, Result};
use arrow::array::{Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

/// PostgreSQL caps bind parameters at u16::MAX per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// Open the destination pool. One connection is enough: the run is the sole,
/// strictly sequential writer.
pub async fn connect(connection_string: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect(connection_string)
        .await
        .map_err(LoadError::SinkWrite)
}

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Float64 => "DOUBLE PRECISION",
        _ => "TEXT",
    }
}

/// `CREATE TABLE` statement inferred from a batch schema: Float64 columns
/// become DOUBLE PRECISION, everything else TEXT.
fn create_table_sql(table: &str, schema: &Schema) -> String {
    let columns = schema
        .fields()
        .iter()
        .map(|f| format!("{} {}", quote_ident(f.name()), sql_type(f.data_type())))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table), columns)
}

/// How many rows fit in one INSERT without exceeding the bind limit.
fn rows_per_statement(num_columns: usize) -> usize {
    (MAX_BIND_PARAMS / num_columns.max(1)).max(1)
}

/// Drop the destination table (if any) and recreate it from the batch-1
/// schema. Existing schema and contents are discarded.
pub async fn replace_table(pool: &PgPool, table: &str, schema: &Schema) -> Result<()> {
    let drop = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
    sqlx::query(&drop)
        .execute(pool)
        .await
        .map_err(LoadError::SinkWrite)?;

    let create = create_table_sql(table, schema);
    debug!(statement = %create, "creating destination table");
    sqlx::query(&create)
        .execute(pool)
        .await
        .map_err(LoadError::SinkWrite)?;
    info!(table, "replaced destination table");
    Ok(())
}

/// Typed view over one batch column, resolved once so the bind loop below
/// stays infallible.
enum ColumnValues<'a> {
    Text(&'a StringArray),
    Float(&'a Float64Array),
}

fn column_views(batch: &RecordBatch) -> Result<Vec<ColumnValues<'_>>> {
    batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| match field.data_type() {
            DataType::Float64 => column
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(ColumnValues::Float)
                .ok_or_else(|| cast_error(field.name(), "float64")),
            _ => column
                .as_any()
                .downcast_ref::<StringArray>()
                .map(ColumnValues::Text)
                .ok_or_else(|| cast_error(field.name(), "utf8")),
        })
        .collect()
}

fn cast_error(column: &str, expected: &str) -> LoadError {
    LoadError::Batch(ArrowError::CastError(format!(
        "column `{}` is not {}",
        column, expected
    )))
}

/// Append every row of `batch` to `table` using multi-row INSERTs, all inside
/// one transaction. Returns the number of rows written. A column set or type
/// that no longer matches the table created from batch 1 surfaces here as
/// [`LoadError::SinkWrite`].
pub async fn append_batch(pool: &PgPool, table: &str, batch: &RecordBatch) -> Result<usize> {
    if batch.num_rows() == 0 {
        return Ok(0);
    }

    let schema = batch.schema();
    let column_list = schema
        .fields()
        .iter()
        .map(|f| quote_ident(f.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_prefix = format!("INSERT INTO {} ({}) VALUES ", quote_ident(table), column_list);
    let columns = column_views(batch)?;
    let step = rows_per_statement(batch.num_columns());

    let mut tx = pool.begin().await.map_err(LoadError::SinkWrite)?;
    let mut start = 0;
    while start < batch.num_rows() {
        let end = (start + step).min(batch.num_rows());
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(&insert_prefix);
        qb.push_values(start..end, |mut binds, row| {
            for column in &columns {
                match column {
                    ColumnValues::Text(values) => {
                        let v = (!values.is_null(row)).then(|| values.value(row).to_string());
                        binds.push_bind(v);
                    }
                    ColumnValues::Float(values) => {
                        let v = (!values.is_null(row)).then(|| values.value(row));
                        binds.push_bind(v);
                    }
                }
            }
        });
        // statement shapes vary with the tail chunk, so skip the cache
        qb.build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .map_err(LoadError::SinkWrite)?;
        start = end;
    }
    tx.commit().await.map_err(LoadError::SinkWrite)?;

    Ok(batch.num_rows())
}

/// Scalar `SELECT COUNT(*)` against the destination table.
pub async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    sqlx::query_scalar(&sql)
        .fetch_one(pool)
        .await
        .map_err(LoadError::SinkRead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("sale_amount"), "\"sale_amount\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn create_table_sql_maps_arrow_types() {
        let schema = Schema::new(vec![
            Field::new("town", DataType::Utf8, true),
            Field::new("sale_amount", DataType::Float64, true),
        ]);
        assert_eq!(
            create_table_sql("real_estate_sales", &schema),
            "CREATE TABLE \"real_estate_sales\" \
             (\"town\" TEXT, \"sale_amount\" DOUBLE PRECISION)"
        );
    }

    #[test]
    fn rows_per_statement_respects_bind_limit() {
        assert_eq!(rows_per_statement(1), 65_535);
        assert_eq!(rows_per_statement(14), 65_535 / 14);
        // degenerate widths still make progress
        assert_eq!(rows_per_statement(0), 65_535);
        assert_eq!(rows_per_statement(MAX_BIND_PARAMS * 2), 1);
    }
}
