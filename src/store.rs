//! Generic entity store
//!
//! Persistence logic for every entity lives here once. An entity is a plain
//! row type implementing [`Entity`]; its columns are a small enum implementing
//! [`Column`], so field names are checked by the compiler rather than at
//! query time.

use std::fmt;
use std::marker::PhantomData;

use sqlx::postgres::{PgPool, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::debug;

use crate::db::finish;
use crate::errors::StoreError;

/// Postgres accepts at most this many bind parameters per statement
const MAX_BIND_PARAMS: usize = 65535;

/// The kind of value a column accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Text,
}

/// A single field value bound into a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// Parse raw text (e.g. a CSV cell) into a value of the given kind
    pub fn parse(kind: ValueKind, raw: &str) -> Result<Self, String> {
        match kind {
            ValueKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("'{raw}' is not an integer ({e})")),
            ValueKind::Text => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Column descriptor for an entity's field enum
pub trait Column: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Every column, primary key first
    const ALL: &'static [Self];
    /// Store-assigned identifier column
    const PRIMARY_KEY: Self;

    fn name(self) -> &'static str;
    fn kind(self) -> ValueKind;

    fn is_primary_key(self) -> bool {
        self == Self::PRIMARY_KEY
    }

    /// Must be present when inserting
    fn is_required(self) -> bool;
}

/// Look a column up by its name
pub fn column_named<C: Column>(name: &str) -> Result<C, StoreError> {
    C::ALL
        .iter()
        .copied()
        .find(|column| column.name() == name)
        .ok_or_else(|| StoreError::validation(format!("unknown field '{name}'")))
}

/// A persisted row type
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    type Field: Column;

    const TABLE: &'static str;

    fn id(&self) -> i64;

    fn select_columns() -> String {
        Self::Field::ALL
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn primary_key() -> &'static str {
        Self::Field::PRIMARY_KEY.name()
    }
}

/// A map of fields to values for inserts and updates
#[derive(Debug, Clone, PartialEq)]
pub struct Fields<F> {
    entries: Vec<(F, Value)>,
}

impl<F: Column> Default for Fields<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Column> Fields<F> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder form of [`Fields::set`]
    pub fn with(mut self, field: F, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, field: F, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: F) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, field: F) -> bool {
        self.get(field).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = F> + '_ {
        self.entries.iter().map(|(f, _)| *f)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn same_fields(&self, other: &Self) -> bool {
        self.len() == other.len() && other.fields().all(|f| self.contains(f))
    }

    /// Reject the primary key and values of the wrong kind
    fn check_writable(&self) -> Result<(), StoreError> {
        for (field, value) in &self.entries {
            if field.is_primary_key() {
                return Err(StoreError::validation(format!(
                    "field '{}' is assigned by the store",
                    field.name()
                )));
            }
            check_kind(*field, value)?;
        }
        Ok(())
    }

    fn check_insertable(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        if let Some(missing) = F::ALL
            .iter()
            .find(|c| c.is_required() && !self.contains(**c))
        {
            return Err(StoreError::validation(format!(
                "missing required field '{}'",
                missing.name()
            )));
        }
        Ok(())
    }
}

fn check_kind<F: Column>(field: F, value: &Value) -> Result<(), StoreError> {
    if field.kind() != value.kind() {
        return Err(StoreError::validation(format!(
            "field '{}' expects {:?}, got {}",
            field.name(),
            field.kind(),
            value
        )));
    }
    Ok(())
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Int(i) => qb.push_bind(*i),
        Value::Text(s) => qb.push_bind(s.clone()),
    };
}

fn push_separated_value(sep: &mut Separated<'_, '_, Postgres, &'static str>, value: &Value) {
    match value {
        Value::Int(i) => sep.push_bind(*i),
        Value::Text(s) => sep.push_bind(s.clone()),
    };
}

/// Comparison operator of a filter predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => " = ",
            Op::Ne => " <> ",
            Op::Lt => " < ",
            Op::Le => " <= ",
            Op::Gt => " > ",
            Op::Ge => " >= ",
            Op::Like => " LIKE ",
        }
    }
}

/// A conjunction of predicates over an entity's columns
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<F> {
    predicates: Vec<(F, Op, Value)>,
}

impl<F: Column> Default for Filter<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Column> Filter<F> {
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    pub fn cond(mut self, field: F, op: Op, value: impl Into<Value>) -> Self {
        self.predicates.push((field, op, value.into()));
        self
    }

    pub fn eq(self, field: F, value: impl Into<Value>) -> Self {
        self.cond(field, Op::Eq, value)
    }

    /// Equality on a field named at runtime; unknown names are an error
    pub fn eq_named(self, name: &str, value: impl Into<Value>) -> Result<Self, StoreError> {
        let field = column_named::<F>(name)?;
        Ok(self.eq(field, value))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        for (field, op, value) in &self.predicates {
            if *op == Op::Like && field.kind() != ValueKind::Text {
                return Err(StoreError::validation(format!(
                    "LIKE is only valid on text fields, not '{}'",
                    field.name()
                )));
            }
            check_kind(*field, value)?;
        }
        Ok(())
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (i, (field, op, value)) in self.predicates.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(field.name());
            qb.push(op.sql());
            push_value(qb, value);
        }
    }
}

/// Persistence operations for one entity type over the shared pool
pub struct Store<T> {
    pool: PgPool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Store<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    /// Insert one record and return it with its assigned id
    pub async fn create(&self, fields: Fields<T::Field>) -> Result<T, StoreError> {
        fields.check_insertable()?;

        let mut tx = self.pool.begin().await?;
        let result = Self::insert_rows(&mut *tx, std::slice::from_ref(&fields))
            .await
            .and_then(|mut rows| {
                rows.pop()
                    .ok_or_else(|| StoreError::validation("insert returned no row"))
            });
        let created = finish(tx, T::TABLE, result).await?;

        debug!(table = T::TABLE, id = created.id(), "Record created");
        Ok(created)
    }

    /// Insert every row in one transaction; any invalid row aborts the batch
    pub async fn bulk_create(&self, rows: Vec<Fields<T::Field>>) -> Result<u64, StoreError> {
        Self::check_batch(&rows)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let result = Self::insert_batch(&mut *tx, &rows).await;
        let inserted = finish(tx, T::TABLE, result).await?;

        debug!(table = T::TABLE, inserted, "Bulk insert committed");
        Ok(inserted)
    }

    /// Insert a batch inside a caller-owned transaction
    pub async fn insert_batch(
        conn: &mut PgConnection,
        rows: &[Fields<T::Field>],
    ) -> Result<u64, StoreError> {
        Self::check_batch(rows)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = Self::insert_rows(conn, rows).await?;
        Ok(inserted.len() as u64)
    }

    fn check_batch(rows: &[Fields<T::Field>]) -> Result<(), StoreError> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        for (i, row) in rows.iter().enumerate() {
            row.check_insertable()
                .map_err(|e| StoreError::validation(format!("row {}: {}", i + 1, inner(e))))?;
            if !row.same_fields(first) {
                return Err(StoreError::validation(format!(
                    "row {}: fields differ from the first row",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    async fn insert_rows(
        conn: &mut PgConnection,
        rows: &[Fields<T::Field>],
    ) -> Result<Vec<T>, StoreError> {
        let columns: Vec<T::Field> = rows[0].fields().collect();
        let mut created = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(rows_per_statement(columns.len())) {
            let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} (", T::TABLE));
            {
                let mut names = qb.separated(", ");
                for column in &columns {
                    names.push(column.name());
                }
            }
            qb.push(") ");
            qb.push_values(chunk, |mut row_values, row| {
                for column in &columns {
                    if let Some(value) = row.get(*column) {
                        push_separated_value(&mut row_values, value);
                    }
                }
            });
            qb.push(" RETURNING ");
            qb.push(T::select_columns());

            let inserted = qb.build_query_as::<T>().fetch_all(&mut *conn).await?;
            created.extend(inserted);
        }

        Ok(created)
    }

    /// All records, most recently created first
    pub async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} DESC",
            T::select_columns(),
            T::TABLE,
            T::primary_key()
        );
        let rows = sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// The most recently created record, if any
    pub async fn first(&self) -> Result<Option<T>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} DESC LIMIT 1",
            T::select_columns(),
            T::TABLE,
            T::primary_key()
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<T>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            T::select_columns(),
            T::TABLE,
            T::primary_key()
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", T::TABLE);
        let count = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Apply a partial update; `None` when no row has this id
    pub async fn update(&self, id: i64, fields: Fields<T::Field>) -> Result<Option<T>, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::validation("nothing to update"));
        }
        fields.check_writable()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", T::TABLE));
        for (i, (field, value)) in fields.entries.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(field.name());
            qb.push(" = ");
            push_value(&mut qb, value);
        }
        qb.push(format!(" WHERE {} = ", T::primary_key()));
        qb.push_bind(id);
        qb.push(" RETURNING ");
        qb.push(T::select_columns());

        let mut tx = self.pool.begin().await?;
        let result = qb
            .build_query_as::<T>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from);
        let updated = finish(tx, T::TABLE, result).await?;

        debug!(table = T::TABLE, id, found = updated.is_some(), "Update applied");
        Ok(updated)
    }

    /// Remove one record and return what it held
    pub async fn delete(&self, id: i64) -> Result<Option<T>, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1 RETURNING {}",
            T::TABLE,
            T::primary_key(),
            T::select_columns()
        );

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from);
        let deleted = finish(tx, T::TABLE, result).await?;

        debug!(table = T::TABLE, id, found = deleted.is_some(), "Delete applied");
        Ok(deleted)
    }

    /// Remove every record and return the removed snapshots
    pub async fn truncate(&self) -> Result<Vec<T>, StoreError> {
        let sql = format!(
            "DELETE FROM {} RETURNING {}",
            T::TABLE,
            T::select_columns()
        );

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_as::<_, T>(&sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::from);
        let removed = finish(tx, T::TABLE, result).await?;

        debug!(table = T::TABLE, removed = removed.len(), "Table truncated");
        Ok(removed)
    }

    /// Records matching every predicate, ordered by id
    pub async fn filter(&self, filter: Filter<T::Field>) -> Result<Vec<T>, StoreError> {
        filter.check()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {}",
            T::select_columns(),
            T::TABLE
        ));
        filter.push_where(&mut qb);
        qb.push(format!(" ORDER BY {}", T::primary_key()));

        let rows = qb.build_query_as::<T>().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

/// Rows that fit in one INSERT under the bind parameter limit
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Message of a validation error without its "Validation error:" prefix
fn inner(err: StoreError) -> String {
    match err {
        StoreError::Validation(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum PetField {
        Id,
        Name,
        OwnerId,
    }

    impl Column for PetField {
        const ALL: &'static [Self] = &[PetField::Id, PetField::Name, PetField::OwnerId];
        const PRIMARY_KEY: Self = PetField::Id;

        fn name(self) -> &'static str {
            match self {
                PetField::Id => "id",
                PetField::Name => "name",
                PetField::OwnerId => "owner_id",
            }
        }

        fn kind(self) -> ValueKind {
            match self {
                PetField::Name => ValueKind::Text,
                _ => ValueKind::Int,
            }
        }

        fn is_required(self) -> bool {
            !self.is_primary_key()
        }
    }

    #[test]
    fn test_fields_set_replaces_existing_value() {
        let fields = Fields::new()
            .with(PetField::Name, "Rex")
            .with(PetField::Name, "Fido");

        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get(PetField::Name), Some(&Value::from("Fido")));
    }

    #[test]
    fn test_insert_requires_every_required_field() {
        let fields = Fields::new().with(PetField::Name, "Rex");
        let err = fields.check_insertable().unwrap_err();
        assert!(err.to_string().contains("owner_id"));

        let fields = fields.with(PetField::OwnerId, 3_i64);
        assert!(fields.check_insertable().is_ok());
    }

    #[test]
    fn test_primary_key_is_not_writable() {
        let fields = Fields::new().with(PetField::Id, 10_i64);
        assert!(matches!(
            fields.check_writable(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_value_kind_mismatch_is_rejected() {
        let fields = Fields::new().with(PetField::OwnerId, "three");
        let err = fields.check_writable().unwrap_err();
        assert!(err.to_string().contains("owner_id"));
    }

    #[test]
    fn test_same_fields_ignores_order() {
        let a = Fields::new().with(PetField::Name, "a").with(PetField::OwnerId, 1_i64);
        let b = Fields::new().with(PetField::OwnerId, 2_i64).with(PetField::Name, "b");
        let c = Fields::new().with(PetField::Name, "c");

        assert!(a.same_fields(&b));
        assert!(!a.same_fields(&c));
    }

    #[test]
    fn test_column_named_rejects_unknown_names() {
        assert_eq!(column_named::<PetField>("owner_id").unwrap(), PetField::OwnerId);
        assert!(matches!(
            column_named::<PetField>("owner"),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_filter_eq_named_unknown_field_errors() {
        let filter = Filter::<PetField>::new().eq_named("nmae", "Rex");
        assert!(filter.is_err());

        let filter = Filter::<PetField>::new().eq_named("name", "Rex").unwrap();
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_filter_like_requires_text_field() {
        let filter = Filter::new().cond(PetField::OwnerId, Op::Like, 1_i64);
        assert!(filter.check().is_err());

        let filter = Filter::new().cond(PetField::Name, Op::Like, "R%");
        assert!(filter.check().is_ok());
    }

    #[test]
    fn test_filter_sql_joins_predicates_with_and() {
        let filter = Filter::new()
            .eq(PetField::OwnerId, 3_i64)
            .cond(PetField::Name, Op::Ne, "Rex");
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM pets");
        filter.push_where(&mut qb);

        assert_eq!(
            qb.sql(),
            "SELECT id FROM pets WHERE owner_id = $1 AND name <> $2"
        );
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse(ValueKind::Int, " 42 "), Ok(Value::Int(42)));
        assert!(Value::parse(ValueKind::Int, "forty").is_err());
        assert_eq!(
            Value::parse(ValueKind::Text, "Toshkent"),
            Ok(Value::Text("Toshkent".to_string()))
        );
    }

    #[test]
    fn test_rows_per_statement_stays_under_bind_limit() {
        assert_eq!(rows_per_statement(2), 32767);
        assert_eq!(rows_per_statement(3), 21845);
        assert!(rows_per_statement(2) * 2 <= MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
    }

    #[test]
    fn test_primary_key_comes_from_column_declaration() {
        assert!(PetField::Id.is_primary_key());
        assert!(!PetField::OwnerId.is_primary_key());
    }
}
