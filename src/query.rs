//! Glue between `sea-query` statements and the [`Executor`] trait.
//!
//! Statements are built with `PostgresQueryBuilder`; the resulting
//! [`Values`] are converted into owned `ToSql` parameters and bound through
//! the executor. Rows are decoded with [`FromRow`].

use crate::executor::{DbError, Executor};
use may_postgres::types::ToSql;
use may_postgres::Row;
use sea_query::{Value, Values};

/// Decodes a typed model from a result row
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, may_postgres::Error>;
}

/// Converts one sea-query value into an owned bind parameter.
///
/// NULLs keep their Rust type so Postgres type checking still matches the
/// target column.
fn to_param(value: &Value) -> Result<Box<dyn ToSql>, DbError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let converted = match v {
                Some(u) => Some(i64::try_from(*u).map_err(|_| {
                    DbError::Other(format!(
                        "BigUnsigned value {} exceeds i64::MAX ({}), cannot be safely cast to i64",
                        u,
                        i64::MAX
                    ))
                })?),
                None => None,
            };
            Box::new(converted)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.clone()),
        Value::Bytes(v) => Box::new(v.clone()),
        other => {
            return Err(DbError::Other(format!(
                "Unsupported value type in query: {:?}",
                other
            )))
        }
    };
    Ok(param)
}

/// Converts `values` and runs `f` with the borrowed parameter slice.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let owned = values
        .iter()
        .map(to_param)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref()).collect();
    f(&params)
}

/// Executes a built statement, returning the affected row count
pub fn execute_built(executor: &dyn Executor, sql: &str, values: &Values) -> Result<u64, DbError> {
    with_converted_params(values, |params| executor.execute(sql, params))
}

/// Runs a built query and returns the raw rows
pub fn query_rows(executor: &dyn Executor, sql: &str, values: &Values) -> Result<Vec<Row>, DbError> {
    with_converted_params(values, |params| executor.query_all(sql, params))
}

/// Runs a built query and decodes every row
pub fn query_models<T: FromRow>(
    executor: &dyn Executor,
    sql: &str,
    values: &Values,
) -> Result<Vec<T>, DbError> {
    query_rows(executor, sql, values)?
        .iter()
        .map(|row| {
            T::from_row(row).map_err(|e| DbError::ParseError(format!("Failed to parse row: {e}")))
        })
        .collect()
}

/// Runs a built query expected to match at most one row
pub fn query_optional<T: FromRow>(
    executor: &dyn Executor,
    sql: &str,
    values: &Values,
) -> Result<Option<T>, DbError> {
    let mut models = query_models::<T>(executor, sql, values)?;
    match models.len() {
        0 => Ok(None),
        1 => Ok(models.pop()),
        n => Err(DbError::QueryError(format!("expected at most one row, got {n}"))),
    }
}

/// Runs a built query whose first column is a `BIGINT` count
pub fn query_count(executor: &dyn Executor, sql: &str, values: &Values) -> Result<i64, DbError> {
    let rows = query_rows(executor, sql, values)?;
    match rows.first() {
        Some(row) => row
            .try_get::<_, i64>(0)
            .map_err(|e| DbError::ParseError(format!("Failed to parse count: {e}"))),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CapturingExecutor {
        captured: RefCell<Vec<(String, usize)>>,
    }

    impl Executor for CapturingExecutor {
        fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
            self.captured.borrow_mut().push((query.to_string(), params.len()));
            Ok(1)
        }

        fn query_one(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<Row, DbError> {
            Err(DbError::QueryError("no rows available for testing".to_string()))
        }

        fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
            self.captured.borrow_mut().push((query.to_string(), params.len()));
            Ok(vec![])
        }
    }

    #[test]
    fn test_params_bound_in_order() {
        use sea_query::{Expr, ExprTrait, PostgresQueryBuilder, Query};

        let (sql, values) = Query::update()
            .table("buildings")
            .value("address", "Main st. 1")
            .value("latitude", 55.75_f64)
            .and_where(Expr::col("id").eq(3_i64))
            .build(PostgresQueryBuilder);

        let exec = CapturingExecutor {
            captured: RefCell::new(Vec::new()),
        };
        let affected = execute_built(&exec, &sql, &values).unwrap();
        assert_eq!(affected, 1);
        let captured = exec.captured.borrow();
        assert_eq!(captured[0].1, 3);
        assert!(captured[0].0.contains("$3"));
    }

    #[test]
    fn test_null_values_are_supported() {
        let values = Values(vec![Value::String(None), Value::BigInt(None), Value::Double(Some(1.5))]);
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_big_unsigned_overflow_rejected() {
        let values = Values(vec![Value::BigUnsigned(Some(u64::MAX))]);
        assert!(with_converted_params(&values, |_| Ok(())).is_err());
    }

    #[test]
    fn test_empty_result_count_is_zero() {
        let exec = CapturingExecutor {
            captured: RefCell::new(Vec::new()),
        };
        let count = query_count(&exec, "SELECT COUNT(*) FROM buildings", &Values(vec![])).unwrap();
        assert_eq!(count, 0);
    }
}
