//! Bulk import of the region hierarchy from `regions.csv` and `districts.csv`.
//!
//! Header names must match entity field names. Both files are parsed and
//! validated in full before anything is written, and both batches are then
//! inserted in a single transaction.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use tracing::info;

use crate::db::finish;
use crate::errors::{ImportError, StoreError};
use crate::models::{District, Region};
use crate::store::{column_named, Column, Entity, Fields, Store, Value};

pub const REGIONS_FILE: &str = "regions.csv";
pub const DISTRICTS_FILE: &str = "districts.csv";

const BOM: char = '\u{feff}';

/// Rows inserted by one import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub regions: u64,
    pub districts: u64,
}

/// Parse a CSV source into field maps for entity `T`
pub fn read_rows<T, R>(reader: R, source_name: &str) -> Result<Vec<Fields<T::Field>>, ImportError>
where
    T: Entity,
    R: Read,
{
    let csv_error = |source| ImportError::Csv {
        source_name: source_name.to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut columns = Vec::with_capacity(headers.len());
    for header in headers.iter() {
        let name = header.trim_start_matches(BOM).trim();
        let column = column_named::<T::Field>(name)
            .map_err(|e| StoreError::validation(format!("{source_name}: {}", message(e))))?;
        if column.is_primary_key() {
            return Err(StoreError::validation(format!(
                "{source_name}: column '{name}' is assigned by the store"
            ))
            .into());
        }
        columns.push(column);
    }

    if let Some(missing) = T::Field::ALL
        .iter()
        .find(|c| c.is_required() && !columns.contains(c))
    {
        return Err(StoreError::validation(format!(
            "{source_name}: missing required column '{}'",
            missing.name()
        ))
        .into());
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        // Header is line 1
        let line = index + 2;

        let mut fields = Fields::new();
        for (column, cell) in columns.iter().zip(record.iter()) {
            if cell.trim().is_empty() {
                if column.is_required() {
                    return Err(StoreError::validation(format!(
                        "{source_name} line {line}: empty '{}'",
                        column.name()
                    ))
                    .into());
                }
                continue;
            }
            let value = Value::parse(column.kind(), cell).map_err(|reason| {
                StoreError::validation(format!(
                    "{source_name} line {line}: '{}' {reason}",
                    column.name()
                ))
            })?;
            fields.set(*column, value);
        }
        rows.push(fields);
    }

    Ok(rows)
}

/// Message of a store error without its variant prefix
fn message(err: StoreError) -> String {
    match err {
        StoreError::Validation(msg) | StoreError::Integrity(msg) => msg,
        other => other.to_string(),
    }
}

fn read_file<T: Entity>(path: &Path) -> Result<Vec<Fields<T::Field>>, ImportError> {
    let file = fs::File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    read_rows::<T, _>(file, &source_name)
}

/// Loads both tabular sources into the store
#[derive(Clone)]
pub struct Importer {
    pool: PgPool,
    dir: PathBuf,
}

impl Importer {
    pub fn new(pool: PgPool, dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            dir: dir.into(),
        }
    }

    /// Import regions, then districts; nothing is kept if either step fails
    pub async fn run(&self) -> Result<ImportReport, ImportError> {
        let regions_path = self.dir.join(REGIONS_FILE);
        let districts_path = self.dir.join(DISTRICTS_FILE);
        info!(dir = %self.dir.display(), "Starting hierarchy import");

        let regions = read_file::<Region>(&regions_path)?;
        let districts = read_file::<District>(&districts_path)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let result = async {
            let regions = Store::<Region>::insert_batch(&mut *tx, &regions).await?;
            let districts = Store::<District>::insert_batch(&mut *tx, &districts).await?;
            Ok::<_, StoreError>(ImportReport { regions, districts })
        }
        .await;
        let report = finish(tx, "regions+districts", result).await?;

        info!(
            regions = report.regions,
            districts = report.districts,
            "Hierarchy import committed"
        );
        Ok(report)
    }
}
