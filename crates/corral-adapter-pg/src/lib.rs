//! # corral-adapter-pg
//!
//! Postgres implementation of the storage collaborator. Compiled plans are
//! rendered to parameterized SQL by [`SqlBuilder`] and executed via `sqlx`;
//! result rows come back as `to_jsonb` payloads and are converted into
//! typed rows. Mutations run inside a transaction so a failed batch leaves
//! no partial write.

pub mod render;

use async_trait::async_trait;
use corral_core::value::{row_from_json, Row, ScalarValue};
use corral_query::{QueryBuilder, QueryPlan};
use corral_runtime::StorageAdapter;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, Row as SqlxRow};

pub use render::{render_select, SqlBuilder};

fn args_add<T>(args: &mut PgArguments, v: T) -> anyhow::Result<()>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(v).map_err(|e| anyhow::anyhow!(e))
}

/// Bind one tagged value as a typed Postgres argument.
fn bind_scalar(args: &mut PgArguments, value: &ScalarValue) -> anyhow::Result<()> {
    match value {
        ScalarValue::Null => args_add(args, Option::<String>::None),
        ScalarValue::Bool(b) => args_add(args, *b),
        ScalarValue::Number(n) => args_add(args, *n),
        ScalarValue::String(s) => args_add(args, s.clone()),
        ScalarValue::DateTime(dt) => args_add(args, *dt),
        ScalarValue::Json(v) => args_add(args, sqlx::types::Json(v.clone())),
        ScalarValue::Bytes(b) => args_add(args, b.clone()),
    }
}

fn quote_ident(ident: &str) -> anyhow::Result<String> {
    if ident.is_empty()
        || !ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(anyhow::anyhow!("invalid identifier '{}'", ident));
    }
    Ok(ident.to_string())
}

/// Storage adapter over a Postgres connection pool.
pub struct PostgresAdapter {
    pool: sqlx::PgPool,
}

impl PostgresAdapter {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn where_clause_for(plan: &QueryPlan, first_param: usize) -> anyhow::Result<(String, Vec<ScalarValue>)> {
        let mut builder = SqlBuilder::starting_at(first_param);
        for op in &plan.ops {
            match op {
                // Mutations only honor filtering ops; projections and
                // pagination have no meaning for UPDATE/DELETE.
                op if op.kind().starts_with("where") => builder.apply(op)?,
                _ => {}
            }
        }
        Ok(builder.into_where())
    }
}

#[async_trait]
impl StorageAdapter for PostgresAdapter {
    async fn execute(&self, table: &str, plan: &QueryPlan) -> anyhow::Result<Vec<Row>> {
        let table = quote_ident(table)?;
        let (sql, bindings) = render_select(&table, plan)?;
        let wrapped = format!("SELECT to_jsonb(t) AS row FROM ({}) AS t", sql);
        tracing::debug!(sql = %wrapped, params = bindings.len(), "executing plan");

        let mut args = PgArguments::default();
        for binding in &bindings {
            bind_scalar(&mut args, binding)?;
        }

        let records = sqlx::query_with(&wrapped, args)
            .fetch_all(&self.pool)
            .await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let json: serde_json::Value = record.try_get("row")?;
            let row = row_from_json(&json)
                .ok_or_else(|| anyhow::anyhow!("storage returned a non-object row"))?;
            rows.push(row);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, records: &[Row]) -> anyhow::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = quote_ident(table)?;

        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for record in records {
            let columns: Vec<&String> = record.keys().collect();
            let markers: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", "),
                markers.join(", ")
            );

            let mut args = PgArguments::default();
            for value in record.values() {
                bind_scalar(&mut args, value)?;
            }
            let result = sqlx::query_with(&sql, args).execute(&mut *tx).await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn update(&self, table: &str, plan: &QueryPlan, changes: &Row) -> anyhow::Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let table = quote_ident(table)?;

        let mut assignments = Vec::with_capacity(changes.len());
        let mut args = PgArguments::default();
        for (idx, (column, value)) in changes.iter().enumerate() {
            assignments.push(format!("{} = ${}", quote_ident(column)?, idx + 1));
            bind_scalar(&mut args, value)?;
        }

        let (where_sql, where_bindings) = Self::where_clause_for(plan, changes.len() + 1)?;
        for binding in &where_bindings {
            bind_scalar(&mut args, binding)?;
        }

        let sql = if where_sql.is_empty() {
            format!("UPDATE {} SET {}", table, assignments.join(", "))
        } else {
            format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                where_sql
            )
        };
        tracing::debug!(sql = %sql, "executing update");

        let result = sqlx::query_with(&sql, args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: &str, plan: &QueryPlan) -> anyhow::Result<u64> {
        let table = quote_ident(table)?;
        let (where_sql, bindings) = Self::where_clause_for(plan, 1)?;

        let mut args = PgArguments::default();
        for binding in &bindings {
            bind_scalar(&mut args, binding)?;
        }

        let sql = if where_sql.is_empty() {
            format!("DELETE FROM {}", table)
        } else {
            format!("DELETE FROM {} WHERE {}", table, where_sql)
        };
        tracing::debug!(sql = %sql, "executing delete");

        let result = sqlx::query_with(&sql, args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::spec::QuerySpec;
    use corral_query::compile;
    use serde_json::json;

    #[test]
    fn identifiers_are_validated() {
        assert!(quote_ident("users").is_ok());
        assert!(quote_ident("public.users").is_ok());
        assert!(quote_ident("users; drop table x").is_err());
        assert!(quote_ident("").is_err());
    }

    #[test]
    fn mutation_where_clause_keeps_only_filtering_ops() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "filter": {"id": 7},
            "orderBy": [{"field": "id"}],
            "aggregates": [{"type": "count", "alias": "n"}],
            "limit": 5
        }))
        .unwrap();
        let plan = compile(&spec).unwrap();

        let (where_sql, bindings) = PostgresAdapter::where_clause_for(&plan, 3).unwrap();
        assert_eq!(where_sql, "id = $3");
        assert_eq!(bindings, vec![ScalarValue::Number(7.0)]);
    }
}
