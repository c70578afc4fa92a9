//! SQL rendering of compiled plans.
//!
//! `SqlBuilder` is the Postgres implementation of the abstract
//! [`QueryBuilder`] capability: it interprets plan ops in order and
//! accumulates SQL text plus positional bindings. Placeholders are numbered
//! `$1..$n`; raw fragments use `?` markers that are renumbered as their
//! bindings are absorbed.

use corral_core::spec::BoolOp;
use corral_core::value::ScalarValue;
use corral_query::{AggregateKind, ClauseOp, QueryBuilder, QueryPlan};

/// Accumulates one SELECT statement from a plan.
pub struct SqlBuilder {
    next_param: usize,
    ctes: Vec<String>,
    recursive_cte: bool,
    selects: Vec<String>,
    has_aggregate: bool,
    wheres: Vec<(BoolOp, String)>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    bindings: Vec<ScalarValue>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start placeholder numbering at `first_param`. Used when the caller
    /// has already bound parameters ahead of the plan (e.g. UPDATE SET).
    pub fn starting_at(first_param: usize) -> Self {
        Self {
            next_param: first_param,
            ctes: Vec::new(),
            recursive_cte: false,
            selects: Vec::new(),
            has_aggregate: false,
            wheres: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            bindings: Vec::new(),
        }
    }

    fn placeholder(&mut self, value: &ScalarValue) -> String {
        let marker = format!("${}", self.next_param);
        self.next_param += 1;
        self.bindings.push(value.clone());
        marker
    }

    /// Renumber a fragment's `?` markers and absorb its bindings.
    fn absorb_fragment(&mut self, fragment: &str, bindings: &[ScalarValue]) -> String {
        let mut out = String::with_capacity(fragment.len());
        for ch in fragment.chars() {
            if ch == '?' {
                out.push_str(&format!("${}", self.next_param));
                self.next_param += 1;
            } else {
                out.push(ch);
            }
        }
        self.bindings.extend(bindings.iter().cloned());
        out
    }

    fn push_where(&mut self, boolean: BoolOp, predicate: String) {
        self.wheres.push((boolean, predicate));
    }

    fn render_condition(&mut self, field: &str, operator: &str, value: &ScalarValue) -> String {
        if value.is_null() && operator == "=" {
            format!("{} IS NULL", field)
        } else {
            let marker = self.placeholder(value);
            format!("{} {} {}", field, operator, marker)
        }
    }

    fn render_in_list(&mut self, field: &str, values: &[ScalarValue], negated: bool) -> String {
        if values.is_empty() {
            // IN over an empty set matches nothing; NOT IN matches everything.
            return if negated { "TRUE".to_string() } else { "FALSE".to_string() };
        }
        let markers: Vec<String> = values.iter().map(|v| self.placeholder(v)).collect();
        let keyword = if negated { "NOT IN" } else { "IN" };
        format!("{} {} ({})", field, keyword, markers.join(", "))
    }

    /// Render a group's inner ops into a parenthesized predicate. The first
    /// clause starts the chain unconditionally; later clauses use their own
    /// connectives.
    fn render_group(&mut self, ops: &[ClauseOp]) -> anyhow::Result<String> {
        let mut rendered = String::new();
        for (idx, op) in ops.iter().enumerate() {
            let (boolean, predicate) = match op {
                ClauseOp::WhereRaw {
                    field,
                    operator,
                    value,
                    boolean,
                } => (*boolean, self.render_condition(field, operator, value)),
                ClauseOp::WhereGroup { boolean, ops } => (*boolean, self.render_group(ops)?),
                other => {
                    anyhow::bail!("unexpected op inside a where group: {}", other.kind())
                }
            };
            if idx == 0 {
                rendered.push_str(&predicate);
            } else {
                rendered.push_str(&format!(" {} {}", connective(boolean), predicate));
            }
        }
        Ok(format!("({})", rendered))
    }

    /// Finish the builder into `(sql, bindings)` for a base table.
    ///
    /// CTE bodies compiled from nested specs are rendered against the same
    /// base table; recursive terms reference their CTE by name through raw
    /// clauses.
    pub fn into_select(self, table: &str) -> (String, Vec<ScalarValue>) {
        let mut sql = String::new();

        if !self.ctes.is_empty() {
            sql.push_str("WITH ");
            if self.recursive_cte {
                sql.push_str("RECURSIVE ");
            }
            sql.push_str(&self.ctes.join(", "));
            sql.push(' ');
        }

        let projection = if !self.group_by.is_empty() {
            let mut cols = self.group_by.clone();
            cols.extend(self.selects.iter().cloned());
            cols.join(", ")
        } else if self.has_aggregate {
            self.selects.join(", ")
        } else if self.selects.is_empty() {
            "*".to_string()
        } else {
            format!("*, {}", self.selects.join(", "))
        };

        sql.push_str(&format!("SELECT {} FROM {}", projection, table));

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_where_chain(&self.wheres));
        }

        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.having.is_empty() {
            sql.push_str(&format!(" HAVING {}", self.having.join(" AND ")));
        }
        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        (sql, self.bindings)
    }

    /// Finish the builder into just its where clause, for UPDATE/DELETE.
    pub fn into_where(self) -> (String, Vec<ScalarValue>) {
        if self.wheres.is_empty() {
            return (String::new(), self.bindings);
        }
        (render_where_chain(&self.wheres), self.bindings)
    }

    fn render_cte_body(&mut self, body: &QueryPlan, table: &str) -> anyhow::Result<String> {
        let mut inner = SqlBuilder::starting_at(self.next_param);
        inner.apply_plan_for(body, table)?;
        self.next_param = inner.next_param;
        let (sql, bindings) = inner.into_select(table);
        self.bindings.extend(bindings);
        Ok(sql)
    }

    /// Apply a full plan against this builder for `table`, threading the
    /// base table into CTE bodies.
    pub fn apply_plan_for(&mut self, plan: &QueryPlan, table: &str) -> anyhow::Result<()> {
        for op in &plan.ops {
            match op {
                ClauseOp::WithCte { name, columns, body } => {
                    let body_sql = self.render_cte_body(body, table)?;
                    self.ctes.push(format!(
                        "{}{} AS ({})",
                        name,
                        column_list(columns),
                        body_sql
                    ));
                }
                ClauseOp::WithRecursiveCte {
                    name,
                    columns,
                    initial,
                    recursive,
                    union_all,
                } => {
                    self.recursive_cte = true;
                    let initial_sql = self.render_cte_body(initial, table)?;
                    let recursive_sql = self.render_cte_body(recursive, table)?;
                    let union = if *union_all { "UNION ALL" } else { "UNION" };
                    self.ctes.push(format!(
                        "{}{} AS ({} {} {})",
                        name,
                        column_list(columns),
                        initial_sql,
                        union,
                        recursive_sql
                    ));
                }
                other => self.apply(other)?,
            }
        }
        Ok(())
    }
}

impl Default for SqlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder for SqlBuilder {
    fn apply(&mut self, op: &ClauseOp) -> anyhow::Result<()> {
        match op {
            // CTE ops need the base table name; route through
            // `apply_plan_for` when a plan may contain them.
            ClauseOp::WithCte { .. } | ClauseOp::WithRecursiveCte { .. } => {
                anyhow::bail!("CTE ops must be applied via apply_plan_for")
            }
            ClauseOp::SelectWindow {
                fragment,
                bindings,
                alias,
            } => {
                let fragment = self.absorb_fragment(fragment, bindings);
                self.selects.push(format!("{} AS {}", fragment, alias));
            }
            ClauseOp::SelectRaw {
                expression,
                bindings,
            } => {
                let fragment = self.absorb_fragment(expression, bindings);
                self.selects.push(fragment);
            }
            ClauseOp::SelectAggregate { kind, field, alias } => {
                self.has_aggregate = true;
                let argument = field.as_deref().unwrap_or("*");
                self.selects
                    .push(format!("{}({}) AS {}", kind.function(), argument, alias));
            }
            ClauseOp::WhereEq { field, value } => {
                let predicate = self.render_condition(field, "=", value);
                self.push_where(BoolOp::And, predicate);
            }
            ClauseOp::WhereRaw {
                field,
                operator,
                value,
                boolean,
            } => {
                let predicate = self.render_condition(field, operator, value);
                self.push_where(*boolean, predicate);
            }
            ClauseOp::WhereBetween { field, low, high } => {
                let low_marker = self.placeholder(low);
                let high_marker = self.placeholder(high);
                self.push_where(
                    BoolOp::And,
                    format!("{} BETWEEN {} AND {}", field, low_marker, high_marker),
                );
            }
            ClauseOp::WhereNull { field } => {
                self.push_where(BoolOp::And, format!("{} IS NULL", field));
            }
            ClauseOp::WhereNotNull { field } => {
                self.push_where(BoolOp::And, format!("{} IS NOT NULL", field));
            }
            ClauseOp::WhereIn { field, values } => {
                let predicate = self.render_in_list(field, values, false);
                self.push_where(BoolOp::And, predicate);
            }
            ClauseOp::WhereNotIn { field, values } => {
                let predicate = self.render_in_list(field, values, true);
                self.push_where(BoolOp::And, predicate);
            }
            ClauseOp::WhereExists { query, bindings } => {
                let sub = self.absorb_fragment(query, bindings);
                self.push_where(BoolOp::And, format!("EXISTS ({})", sub));
            }
            ClauseOp::WhereGroup { boolean, ops } => {
                let group = self.render_group(ops)?;
                self.push_where(*boolean, group);
            }
            ClauseOp::GroupBy { fields } => {
                self.group_by = fields.clone();
            }
            ClauseOp::Having {
                field,
                operator,
                value,
            } => {
                let marker = self.placeholder(value);
                self.having.push(format!("{} {} {}", field, operator, marker));
            }
            ClauseOp::OrderBy {
                field,
                direction,
                nulls,
            } => {
                let term = match nulls {
                    Some(nulls) => format!("{} {} {}", field, direction, nulls),
                    None => format!("{} {}", field, direction),
                };
                self.order_by.push(term);
            }
            ClauseOp::Limit { limit } => {
                self.limit = Some(*limit);
            }
            ClauseOp::Offset { offset } => {
                self.offset = Some(*offset);
            }
        }
        Ok(())
    }
}

fn connective(boolean: BoolOp) -> &'static str {
    match boolean {
        BoolOp::And => "AND",
        BoolOp::Or => "OR",
    }
}

fn column_list(columns: &[String]) -> String {
    if columns.is_empty() {
        String::new()
    } else {
        format!(" ({})", columns.join(", "))
    }
}

fn render_where_chain(wheres: &[(BoolOp, String)]) -> String {
    let mut out = String::new();
    for (idx, (boolean, predicate)) in wheres.iter().enumerate() {
        if idx == 0 {
            out.push_str(predicate);
        } else {
            out.push_str(&format!(" {} {}", connective(*boolean), predicate));
        }
    }
    out
}

/// Render a full read plan for a table.
pub fn render_select(table: &str, plan: &QueryPlan) -> anyhow::Result<(String, Vec<ScalarValue>)> {
    let mut builder = SqlBuilder::new();
    builder.apply_plan_for(plan, table)?;
    Ok(builder.into_select(table))
}
