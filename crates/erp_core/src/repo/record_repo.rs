//! Schema-driven record repository and its SQLite implementation.
//!
//! # Responsibility
//! - Provide the CRUD contract every entity table shares: lookup by id, by
//!   unique column and by parent, plus create/update/delete.
//! - Translate between JSON scalars and SQLite storage classes per column.
//!
//! # Invariants
//! - Only columns declared in the entity schema reach SQL text; values are
//!   always bound as parameters.
//! - Decimal columns are written as fixed-point text and read back as text.
//! - Boolean columns round-trip as `0/1` and reject any other stored value.
//! - `update` and `delete` report `NoRowsAffected` instead of succeeding
//!   silently.

use crate::db::DbError;
use crate::model::schema::{
    EntityKind, EntitySchema, FieldDef, FieldKind, CREATED_AT_FIELD, UPDATED_AT_FIELD,
};
use crate::model::{EntityId, Record, ID_FIELD};
use crate::reconcile::normalize::decimal_value;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection, Row};
use serde_json::{Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

const TOUCH_UPDATED_AT_SQL: &str = "updated_at = (strftime('%s', 'now') * 1000)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage constraint family reported by SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

/// Repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Keyed write matched no row.
    NoRowsAffected { entity: EntityKind, id: EntityId },
    /// Column is not declared by the entity schema.
    UnknownColumn { entity: EntityKind, column: String },
    /// Value cannot be stored in the declared column type.
    InvalidValue {
        entity: EntityKind,
        column: &'static str,
        expected: &'static str,
    },
    /// Parent lookups were requested on a root entity.
    NotAChildEntity(EntityKind),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl RepoError {
    /// Constraint family when the error is a SQLite constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        let Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))) = self else {
            return None;
        };
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                Some(ConstraintKind::Unique)
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(ConstraintKind::ForeignKey),
            ffi::SQLITE_CONSTRAINT_NOTNULL => Some(ConstraintKind::NotNull),
            ffi::SQLITE_CONSTRAINT_CHECK => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NoRowsAffected { entity, id } => {
                write!(f, "write on {entity} {id} affected no rows")
            }
            Self::UnknownColumn { entity, column } => {
                write!(f, "{entity} has no column `{column}`")
            }
            Self::InvalidValue {
                entity,
                column,
                expected,
            } => write!(f, "{entity}.{column} expects {expected}"),
            Self::NotAChildEntity(entity) => write!(f, "{entity} has no parent key"),
            Self::MissingRequiredTable(table) => {
                write!(f, "record repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "record repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface shared by every entity table.
pub trait RecordRepository {
    fn kind(&self) -> EntityKind;
    fn find_by_id(&self, id: EntityId) -> RepoResult<Option<Record>>;
    fn find_by_unique_field(&self, field: &str, value: &Value) -> RepoResult<Option<Record>>;
    /// Rows owned by `parent_id`, ordered by ordering key (if any) then id.
    fn find_all_by_parent(&self, parent_id: EntityId) -> RepoResult<Vec<Record>>;
    fn create(&self, data: &Record) -> RepoResult<Record>;
    fn update(&self, id: EntityId, data: &Record) -> RepoResult<Record>;
    fn delete(&self, id: EntityId) -> RepoResult<()>;
}

/// SQLite-backed record repository for one entity schema.
///
/// Borrows a plain connection or an open transaction; it never begins,
/// commits or rolls back on its own.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
    schema: &'static EntitySchema,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Creates a repository after checking the table shape on `conn`.
    pub fn try_new(conn: &'conn Connection, kind: EntityKind) -> RepoResult<Self> {
        let schema = kind.schema();
        ensure_table_ready(conn, schema)?;
        Ok(Self { conn, schema })
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {}",
            self.schema.select_columns().join(", "),
            self.schema.table
        )
    }

    fn query_records(&self, sql: &str, params: Vec<SqlValue>) -> RepoResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(self.schema, row)?);
        }
        Ok(records)
    }

    fn bind_columns(&self, data: &Record) -> RepoResult<Vec<(&'static str, SqlValue)>> {
        data.iter()
            .map(|(column, value)| {
                let field = self
                    .schema
                    .field(column)
                    .ok_or_else(|| RepoError::UnknownColumn {
                        entity: self.schema.kind,
                        column: column.clone(),
                    })?;
                Ok((field.name, to_sql_value(self.schema.kind, field, value)?))
            })
            .collect()
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn kind(&self) -> EntityKind {
        self.schema.kind
    }

    fn find_by_id(&self, id: EntityId) -> RepoResult<Option<Record>> {
        let sql = format!("{} WHERE {ID_FIELD} = ?1;", self.select_sql());
        Ok(self
            .query_records(&sql, vec![SqlValue::Integer(id)])?
            .into_iter()
            .next())
    }

    fn find_by_unique_field(&self, field: &str, value: &Value) -> RepoResult<Option<Record>> {
        let def = self
            .schema
            .field(field)
            .ok_or_else(|| RepoError::UnknownColumn {
                entity: self.schema.kind,
                column: field.to_string(),
            })?;
        if value.is_null() {
            return Ok(None);
        }

        let bound = to_sql_value(self.schema.kind, def, value)?;
        let sql = format!(
            "{} WHERE {} = ?1 ORDER BY {ID_FIELD} ASC LIMIT 1;",
            self.select_sql(),
            def.name
        );
        Ok(self.query_records(&sql, vec![bound])?.into_iter().next())
    }

    fn find_all_by_parent(&self, parent_id: EntityId) -> RepoResult<Vec<Record>> {
        let parent_key = self
            .schema
            .parent_key
            .ok_or(RepoError::NotAChildEntity(self.schema.kind))?;
        let order_by = match self.schema.ordering_key {
            Some(key) => format!("{key} ASC, {ID_FIELD} ASC"),
            None => format!("{ID_FIELD} ASC"),
        };
        let sql = format!(
            "{} WHERE {parent_key} = ?1 ORDER BY {order_by};",
            self.select_sql()
        );
        self.query_records(&sql, vec![SqlValue::Integer(parent_id)])
    }

    fn create(&self, data: &Record) -> RepoResult<Record> {
        let bound = self.bind_columns(data)?;
        if bound.is_empty() {
            self.conn.execute(
                &format!("INSERT INTO {} DEFAULT VALUES;", self.schema.table),
                [],
            )?;
        } else {
            let columns: Vec<&str> = bound.iter().map(|(column, _)| *column).collect();
            let placeholders: Vec<String> =
                (1..=bound.len()).map(|index| format!("?{index}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({});",
                self.schema.table,
                columns.join(", "),
                placeholders.join(", ")
            );
            self.conn
                .execute(&sql, params_from_iter(bound.into_iter().map(|(_, value)| value)))?;
        }

        let id = self.conn.last_insert_rowid();
        self.find_by_id(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "{} row {id} missing right after insert",
                self.schema.table
            ))
        })
    }

    fn update(&self, id: EntityId, data: &Record) -> RepoResult<Record> {
        let bound = self.bind_columns(data)?;
        if !bound.is_empty() {
            let assignments: Vec<String> = bound
                .iter()
                .enumerate()
                .map(|(index, (column, _))| format!("{column} = ?{}", index + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {}, {TOUCH_UPDATED_AT_SQL} WHERE {ID_FIELD} = ?{};",
                self.schema.table,
                assignments.join(", "),
                bound.len() + 1
            );
            let params = bound
                .into_iter()
                .map(|(_, value)| value)
                .chain(std::iter::once(SqlValue::Integer(id)));
            let changed = self.conn.execute(&sql, params_from_iter(params))?;
            if changed == 0 {
                return Err(RepoError::NoRowsAffected {
                    entity: self.schema.kind,
                    id,
                });
            }
        }

        self.find_by_id(id)?.ok_or(RepoError::NoRowsAffected {
            entity: self.schema.kind,
            id,
        })
    }

    fn delete(&self, id: EntityId) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE {ID_FIELD} = ?1;", self.schema.table),
            [id],
        )?;
        if changed == 0 {
            return Err(RepoError::NoRowsAffected {
                entity: self.schema.kind,
                id,
            });
        }
        Ok(())
    }
}

fn to_sql_value(entity: EntityKind, field: &FieldDef, value: &Value) -> RepoResult<SqlValue> {
    let invalid = |expected: &'static str| RepoError::InvalidValue {
        entity,
        column: field.name,
        expected,
    };

    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match field.kind {
        FieldKind::Decimal => decimal_value(value)
            .map(|parsed| SqlValue::Text(format_decimal(parsed)))
            .ok_or_else(|| invalid("a decimal number")),
        FieldKind::Integer | FieldKind::Timestamp => value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|parsed| parsed.is_finite() && parsed.fract() == 0.0)
                    .map(|parsed| parsed as i64)
            })
            .map(SqlValue::Integer)
            .ok_or_else(|| invalid("an integer")),
        FieldKind::Boolean => value
            .as_bool()
            .map(|flag| SqlValue::Integer(i64::from(flag)))
            .ok_or_else(|| invalid("a boolean")),
        FieldKind::Text => value
            .as_str()
            .map(|text| SqlValue::Text(text.to_string()))
            .ok_or_else(|| invalid("a string")),
    }
}

fn format_decimal(value: f64) -> String {
    format!("{value}")
}

fn column_kind(schema: &EntitySchema, column: &str) -> FieldKind {
    match column {
        ID_FIELD => FieldKind::Integer,
        CREATED_AT_FIELD | UPDATED_AT_FIELD => FieldKind::Timestamp,
        other => schema
            .field(other)
            .map_or(FieldKind::Text, |field| field.kind),
    }
}

fn parse_record_row(schema: &EntitySchema, row: &Row<'_>) -> RepoResult<Record> {
    let mut record = Record::new();
    for (index, column) in schema.select_columns().into_iter().enumerate() {
        let kind = column_kind(schema, column);
        let value = match row.get_ref(index)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(stored) if kind == FieldKind::Boolean => match stored {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(RepoError::InvalidData(format!(
                        "invalid boolean value `{other}` in {}.{column}",
                        schema.table
                    )));
                }
            },
            ValueRef::Integer(stored) => Value::from(stored),
            ValueRef::Real(stored) => Number::from_f64(stored)
                .map(Value::Number)
                .ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "non-finite number in {}.{column}",
                        schema.table
                    ))
                })?,
            ValueRef::Text(bytes) => Value::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| {
                        RepoError::InvalidData(format!(
                            "non UTF-8 text in {}.{column}",
                            schema.table
                        ))
                    })?
                    .to_string(),
            ),
            ValueRef::Blob(_) => {
                return Err(RepoError::InvalidData(format!(
                    "unexpected blob in {}.{column}",
                    schema.table
                )));
            }
        };
        record.insert(column.to_string(), value);
    }
    Ok(record)
}

fn ensure_table_ready(conn: &Connection, schema: &'static EntitySchema) -> RepoResult<()> {
    if !table_exists(conn, schema.table)? {
        return Err(RepoError::MissingRequiredTable(schema.table));
    }

    let present = table_columns(conn, schema.table)?;
    for column in schema.select_columns() {
        if !present.iter().any(|name| name == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: schema.table,
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}
