use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};
use tracing::{info, warn};

use crate::models::{FieldValue, MonthlyMatrices, MonthlyMatrix, ProgramRow, ProgramTable};

pub const SCHEMA: &str = "program_metrics";
pub const PROGRAMS_TABLE: &str = "programs";
pub const MONTHLY_HOURS_TABLE: &str = "monthly_hours";
pub const MONTHLY_ENROLLMENTS_TABLE: &str = "monthly_enrollments";

pub async fn fetch_columns(pool: &PgPool, table: &str) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT column_name::text AS column_name
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        "#,
    )
    .bind(SCHEMA)
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| row.get::<String, _>("column_name")).collect())
}

async fn fetch_rows(pool: &PgPool, table: &str) -> anyhow::Result<Vec<ProgramRow>> {
    let query = format!("SELECT * FROM {SCHEMA}.{table} ORDER BY id");
    let records = sqlx::query(&query).fetch_all(pool).await?;
    Ok(records.iter().map(decode_row).collect())
}

/// Columns and rows of the program table, read once per invocation.
pub async fn fetch_program_table(pool: &PgPool) -> anyhow::Result<ProgramTable> {
    let columns = fetch_columns(pool, PROGRAMS_TABLE)
        .await
        .context("failed to read program table columns")?;
    let rows = fetch_rows(pool, PROGRAMS_TABLE)
        .await
        .context("failed to read program rows")?;
    info!(columns = columns.len(), rows = rows.len(), "loaded program snapshot");
    Ok(ProgramTable { columns, rows })
}

/// Monthly side tables; a missing or unreadable table yields an empty matrix.
pub async fn fetch_monthly_matrices(pool: &PgPool) -> MonthlyMatrices {
    MonthlyMatrices {
        hours: fetch_matrix(pool, MONTHLY_HOURS_TABLE).await,
        enrollments: fetch_matrix(pool, MONTHLY_ENROLLMENTS_TABLE).await,
    }
}

async fn fetch_matrix(pool: &PgPool, table: &str) -> MonthlyMatrix {
    match fetch_rows(pool, table).await {
        Ok(rows) => {
            let matrix = MonthlyMatrix::from_rows(&rows);
            if matrix.is_empty() {
                warn!(table, "monthly table has no programs");
            } else {
                info!(table, programs = matrix.len(), "loaded monthly matrix");
            }
            matrix
        }
        Err(err) => {
            warn!(table, error = %err, "monthly table unavailable, treating as empty");
            MonthlyMatrix::default()
        }
    }
}

fn decode_row(row: &PgRow) -> ProgramRow {
    let mut program = ProgramRow::new();
    for column in row.columns() {
        program.insert(column.name(), decode_value(row, column.ordinal()));
    }
    program
}

fn decode_value(row: &PgRow, idx: usize) -> FieldValue {
    let Ok(raw) = row.try_get_raw(idx) else {
        return FieldValue::Null;
    };
    if raw.is_null() {
        return FieldValue::Null;
    }
    let type_name = raw.type_info().name().to_string();
    let decoded = match type_name.as_str() {
        "INT2" => row.try_get::<i16, _>(idx).map(|v| FieldValue::Int(v.into())),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| FieldValue::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(idx).map(FieldValue::Int),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| FieldValue::Real(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(FieldValue::Real),
        "NUMERIC" => row.try_get::<Decimal, _>(idx).map(numeric_value),
        "BOOL" => row.try_get::<bool, _>(idx).map(|v| FieldValue::Int(v.into())),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(|d| FieldValue::Text(d.format("%Y-%m-%d").to_string())),
        _ => row.try_get::<String, _>(idx).map(FieldValue::Text),
    };
    decoded.unwrap_or_else(|err| {
        warn!(column = idx, type_name = %type_name, error = %err, "undecodable cell read as null");
        FieldValue::Null
    })
}

fn numeric_value(value: Decimal) -> FieldValue {
    match value.to_f64() {
        Some(real) => FieldValue::Real(real),
        None => FieldValue::Text(value.to_string()),
    }
}

/// Read a CSV export; the header row supplies the physical column names.
///
/// Empty cells are null. Everything else stays text and is coerced on read.
pub fn read_csv_table<R: Read>(reader: R) -> anyhow::Result<ProgramTable> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = ProgramRow::new();
        for (column, cell) in columns.iter().zip(record.iter()) {
            let value = if cell.trim().is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(cell.to_string())
            };
            row.insert(column.clone(), value);
        }
        rows.push(row);
    }

    Ok(ProgramTable { columns, rows })
}

pub fn load_csv_table(path: &Path) -> anyhow::Result<ProgramTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let table = read_csv_table(file)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!(
        path = %path.display(),
        columns = table.columns.len(),
        rows = table.rows.len(),
        "loaded program snapshot"
    );
    Ok(table)
}

pub fn load_csv_matrix(path: Option<&Path>) -> anyhow::Result<MonthlyMatrix> {
    let Some(path) = path else {
        return Ok(MonthlyMatrix::default());
    };
    let table = load_csv_table(path)?;
    Ok(MonthlyMatrix::from_rows(&table.rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, SchemaMapping};

    #[test]
    fn csv_headers_become_columns() {
        let data = "\u{feff}id,HRD_Net_과정명,수료산정 제외인원,HRD_만족도\n\
                    1,Cloud Native,2,4.5\n\
                    2,Data Basics,,\n";
        let table = read_csv_table(data.as_bytes()).unwrap();
        assert_eq!(table.columns[0], "id");
        assert_eq!(table.rows.len(), 2);

        let mapping = SchemaMapping::resolve(&table.columns);
        assert_eq!(mapping.int(&table.rows[0], Field::CompletionExcluded), 2);
        assert_eq!(mapping.float(&table.rows[0], Field::Satisfaction), 4.5);
        assert_eq!(
            mapping.value(&table.rows[1], Field::Satisfaction),
            Some(&FieldValue::Null)
        );
        assert_eq!(table.rows[1].id(), Some(2));
    }

    #[test]
    fn csv_matrix_keys_by_id() {
        let data = "id,1M,2M,3M,4M,5M,6M,7M,8M,9M,10M,11M,12M\n\
                    9,40,40,38,,,,,,,,,\n";
        let table = read_csv_table(data.as_bytes()).unwrap();
        let matrix = MonthlyMatrix::from_rows(&table.rows);
        assert_eq!(matrix.value(9, 3), 38);
        assert_eq!(matrix.value(9, 4), 0);
    }

    #[test]
    fn numeric_cells_count_as_real_values() {
        let mapping = SchemaMapping::resolve(&["HRD_확정", "수료인원", "HRD_만족도"]);
        let row = ProgramRow::new()
            .with("HRD_확정", numeric_value(Decimal::new(20, 0)))
            .with("수료인원", numeric_value(Decimal::new(15, 0)))
            .with("HRD_만족도", numeric_value(Decimal::new(435, 2)));
        assert!(matches!(
            row.get("HRD_만족도"),
            Some(FieldValue::Real(v)) if (v - 4.35).abs() < 1e-9
        ));

        let totals = crate::kpi::aggregate([&row], &mapping);
        assert_eq!(totals.confirmed, 20);
        assert_eq!(totals.completed, 15);
        assert_eq!(totals.satisfaction_count, 1);
        assert!((totals.rates().satisfaction - 4.35).abs() < 1e-9);
    }

    #[test]
    fn missing_matrix_path_is_empty() {
        assert!(load_csv_matrix(None).unwrap().is_empty());
    }
}
