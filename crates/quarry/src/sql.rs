//! SeaQuery-backed subject.
//!
//! [`SqlSubject`] records every wizard operation and renders a PostgreSQL
//! SELECT for the root query plus one SELECT per eager-loaded relation path.
//! Relation constraints become `EXISTS` sub-queries joined on the keys
//! declared in the [`ModelRegistry`].

use std::sync::Arc;

use indexmap::IndexMap;
use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, JoinType, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value as SqlValue,
};
use serde_json::Value;

use crate::error::{WizardError, WizardResult};
use crate::model::{ModelRegistry, RelationDescriptor, RelationKind};
use crate::subject::{
    Aggregate, Comparison, RelationConstraint, SortDirection, Subject, TrashedMode,
};

/// A subject that builds SQL for one model.
#[derive(Debug, Clone)]
pub struct SqlSubject {
    registry: Arc<ModelRegistry>,
    model: String,
    table: String,
    soft_delete: Option<String>,
    trashed: TrashedMode,
    conditions: Vec<SimpleExpr>,
    columns: Vec<String>,
    aggregates: Vec<(SimpleExpr, String)>,
    orders: Vec<(SimpleExpr, Order)>,
    eager: IndexMap<String, Option<Vec<String>>>,
}

impl SqlSubject {
    /// Start a query for a registered model.
    pub fn new(registry: Arc<ModelRegistry>, model: &str) -> WizardResult<Self> {
        let descriptor = registry.model(model)?;
        let table = descriptor.table().to_string();
        let soft_delete = descriptor.soft_delete_column().map(str::to_string);
        Ok(Self {
            registry,
            model: model.to_string(),
            table,
            soft_delete,
            trashed: TrashedMode::default(),
            conditions: Vec::new(),
            columns: Vec::new(),
            aggregates: Vec::new(),
            orders: Vec::new(),
            eager: IndexMap::new(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Registered eager loads: relation path → selected columns (`None`
    /// selects everything).
    pub fn eager_loads(&self) -> &IndexMap<String, Option<Vec<String>>> {
        &self.eager
    }

    /// Render the root SELECT.
    pub fn to_sql(&self) -> String {
        self.statement().to_string(PostgresQueryBuilder)
    }

    /// Render a COUNT query with the same constraints.
    pub fn to_count_sql(&self) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());
        query.from(Alias::new(&self.table));
        self.add_conditions(&mut query);
        query.to_string(PostgresQueryBuilder)
    }

    /// Render the SELECT used to eager-load `path`, without the parent key
    /// constraint (which depends on the parent rows).
    pub fn eager_sql(&self, path: &str) -> WizardResult<String> {
        let Some(columns) = self.eager.get(path) else {
            return Err(WizardError::UnknownRelation {
                model: self.model.clone(),
                relation: path.to_string(),
            });
        };

        let (parent_path, segment) = crate::support::split_last(path);
        let parent = self
            .registry
            .model_at_path(&self.model, parent_path)
            .ok_or_else(|| WizardError::UnknownRelation {
                model: self.model.clone(),
                relation: path.to_string(),
            })?;
        let relation = self.registry.relation(parent.name(), segment)?;
        if relation.kind == RelationKind::MorphTo {
            return Err(WizardError::Subject(format!(
                "eager load of polymorphic relation `{path}` depends on each parent row"
            )));
        }
        let related = self.registry.model(&relation.related)?;

        let mut query = Query::select();
        match columns {
            Some(columns) if !columns.is_empty() => {
                for column in columns {
                    query.column((Alias::new(related.table()), Alias::new(column)));
                }
            }
            _ => {
                query.column((Alias::new(related.table()), Asterisk));
            }
        }
        query.from(Alias::new(related.table()));
        if let Some(column) = related.soft_delete_column() {
            query.and_where(Expr::col((Alias::new(related.table()), Alias::new(column))).is_null());
        }
        Ok(query.to_string(PostgresQueryBuilder))
    }

    fn statement(&self) -> SelectStatement {
        let mut query = Query::select();

        if self.columns.is_empty() {
            query.column((Alias::new(&self.table), Asterisk));
        } else {
            for column in &self.columns {
                query.expr(self.column_expr(column));
            }
        }
        for (expr, alias) in &self.aggregates {
            query.expr_as(expr.clone(), Alias::new(alias));
        }

        query.from(Alias::new(&self.table));
        self.add_conditions(&mut query);

        for (expr, order) in &self.orders {
            query.order_by_expr(expr.clone(), order.clone());
        }
        query
    }

    fn add_conditions(&self, query: &mut SelectStatement) {
        for condition in &self.conditions {
            query.and_where(condition.clone());
        }
        if let Some(column) = &self.soft_delete {
            let col = Expr::col((Alias::new(&self.table), Alias::new(column)));
            match self.trashed {
                TrashedMode::Without => {
                    query.and_where(col.is_null());
                }
                TrashedMode::Only => {
                    query.and_where(col.is_not_null());
                }
                TrashedMode::With => {}
            }
        }
    }

    /// SQL text for a column: `"table"."col"`, or a JSON path extraction
    /// for `col->a->b`.
    fn column_sql(&self, column: &str) -> String {
        let (table, column) = self.split_qualified(column);
        let mut parts = column.split("->");
        let base = parts.next().unwrap_or(column);
        let path: Vec<&str> = parts.collect();
        let mut sql = format!("\"{table}\".\"{base}\"");
        for (i, part) in path.iter().enumerate() {
            if i == path.len() - 1 {
                sql = format!("({sql}->>'{part}')");
            } else {
                sql = format!("({sql}->'{part}')");
            }
        }
        sql
    }

    fn column_expr(&self, column: &str) -> SimpleExpr {
        if column.contains("->") {
            return Expr::cust(self.column_sql(column));
        }
        let (table, column) = self.split_qualified(column);
        Expr::col((Alias::new(table), Alias::new(column))).into()
    }

    fn split_qualified<'a>(&'a self, column: &'a str) -> (&'a str, &'a str) {
        match column.split_once('.') {
            Some((table, column)) if !table.contains("->") => (table, column),
            _ => (&self.table, column),
        }
    }

    /// Related model query joined to this one for `relation`.
    fn related_query(
        &self,
        relation_name: &str,
        relation: &RelationDescriptor,
    ) -> WizardResult<(SqlSubject, SelectStatement)> {
        if relation.kind == RelationKind::MorphTo {
            return Err(WizardError::Subject(format!(
                "cannot constrain polymorphic relation `{relation_name}` without a target type"
            )));
        }

        let related = SqlSubject::new(Arc::clone(&self.registry), &relation.related)?;
        let parent_key = self.registry.model(&self.model)?.key_name().to_string();
        let parent = Alias::new(&self.table);
        let child = Alias::new(&related.table);

        let mut query = Query::select();
        query.from(child.clone());

        match relation.kind {
            RelationKind::BelongsTo => {
                query.and_where(
                    Expr::col((child.clone(), Alias::new(&relation.local_key)))
                        .equals((parent.clone(), Alias::new(&relation.foreign_key))),
                );
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                query.and_where(
                    Expr::col((child.clone(), Alias::new(&relation.foreign_key)))
                        .equals((parent.clone(), Alias::new(&relation.local_key))),
                );
            }
            RelationKind::MorphOne | RelationKind::MorphMany => {
                query.and_where(
                    Expr::col((child.clone(), Alias::new(&relation.foreign_key)))
                        .equals((parent.clone(), Alias::new(&relation.local_key))),
                );
                if let (Some(column), Some(class)) = (&relation.morph_type, &relation.morph_class) {
                    query.and_where(Expr::col((child.clone(), Alias::new(column))).eq(class.as_str()));
                }
            }
            RelationKind::BelongsToMany | RelationKind::MorphToMany => {
                let Some(pivot) = &relation.pivot else {
                    return Err(WizardError::Subject(format!(
                        "relation `{relation_name}` has no pivot table"
                    )));
                };
                let pivot_table = Alias::new(&pivot.table);
                query.join(
                    JoinType::InnerJoin,
                    pivot_table.clone(),
                    Expr::col((pivot_table.clone(), Alias::new(&pivot.related_pivot_key)))
                        .equals((child.clone(), Alias::new(&relation.local_key))),
                );
                query.and_where(
                    Expr::col((pivot_table.clone(), Alias::new(&pivot.foreign_pivot_key)))
                        .equals((parent.clone(), Alias::new(&parent_key))),
                );
                if let (Some(column), Some(class)) = (&relation.morph_type, &relation.morph_class) {
                    query.and_where(Expr::col((pivot_table, Alias::new(column))).eq(class.as_str()));
                }
            }
            RelationKind::HasManyThrough => {
                let Some(through) = &relation.through else {
                    return Err(WizardError::Subject(format!(
                        "relation `{relation_name}` has no intermediate table"
                    )));
                };
                let through_table = Alias::new(&through.table);
                query.join(
                    JoinType::InnerJoin,
                    through_table.clone(),
                    Expr::col((through_table.clone(), Alias::new(&through.second_local_key)))
                        .equals((child.clone(), Alias::new(&through.second_key))),
                );
                query.and_where(
                    Expr::col((through_table, Alias::new(&through.first_key)))
                        .equals((parent.clone(), Alias::new(&relation.local_key))),
                );
            }
            RelationKind::MorphTo => {}
        }

        Ok((related, query))
    }

    fn relation_subquery(&self, relation_name: &str) -> WizardResult<(SqlSubject, SelectStatement)> {
        let relation = self.registry.relation(&self.model, relation_name)?.clone();
        self.related_query(relation_name, &relation)
    }

    fn aggregate_subquery(&self, relation: &str, select: SimpleExpr) -> Option<SelectStatement> {
        match self.relation_subquery(relation) {
            Ok((related, mut query)) => {
                query.expr(select);
                related.add_conditions(&mut query);
                Some(query)
            }
            Err(e) => {
                tracing::warn!(relation, error = %e, "skipping relation aggregate");
                None
            }
        }
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        other => other.to_string().into(),
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl Subject for SqlSubject {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn qualify_column(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{column}", self.table)
        }
    }

    fn where_compare(&mut self, column: &str, op: Comparison, value: Value) {
        let expr = self.column_expr(column);
        let value = sql_value(&value);
        self.conditions.push(match op {
            Comparison::Eq => expr.eq(value),
            Comparison::Gte => expr.gte(value),
            Comparison::Lte => expr.lte(value),
        });
    }

    fn where_in(&mut self, column: &str, values: Vec<Value>) {
        if values.is_empty() {
            self.conditions.push(Expr::cust("FALSE"));
            return;
        }
        let expr = self.column_expr(column);
        self.conditions
            .push(expr.is_in(values.iter().map(sql_value).collect::<Vec<_>>()));
    }

    fn where_null(&mut self, column: &str, negate: bool) {
        let expr = self.column_expr(column);
        self.conditions
            .push(if negate { expr.is_not_null() } else { expr.is_null() });
    }

    fn where_contains(&mut self, column: &str, needles: &[String]) {
        let column_sql = self.column_sql(column);
        let mut cond = Cond::any();
        for needle in needles {
            let pattern = format!("%{}%", escape_like_wildcards(&needle.to_lowercase()));
            cond = cond.add(Expr::cust_with_values(
                format!("LOWER({column_sql}) LIKE $1"),
                [pattern],
            ));
        }
        self.conditions.push(cond.into());
    }

    fn where_json_contains(&mut self, column: &str, path: &[String], values: &[Value], match_all: bool) {
        let mut target = self.column_sql(column);
        for segment in path {
            target = format!("({target}->'{segment}')");
        }

        let mut cond = if match_all { Cond::all() } else { Cond::any() };
        for value in values {
            cond = cond.add(Expr::cust_with_values(
                format!("({target})::jsonb @> $1::jsonb"),
                [value.to_string()],
            ));
        }
        self.conditions.push(cond.into());
    }

    fn where_has(&mut self, relation: &str, constraint: RelationConstraint<'_>) -> WizardResult<()> {
        let (mut related, mut query) = self.relation_subquery(relation)?;
        constraint(&mut related)?;
        query.expr(Expr::cust("1"));
        related.add_conditions(&mut query);
        self.conditions.push(Expr::exists(query));
        Ok(())
    }

    fn with_trashed(&mut self, mode: TrashedMode) {
        if self.soft_delete.is_none() {
            tracing::debug!(model = %self.model, "trashed filter on model without soft deletes");
        }
        self.trashed = mode;
    }

    fn select(&mut self, columns: &[String]) {
        self.columns = columns.to_vec();
    }

    fn with_relation(&mut self, path: &str, columns: Option<Vec<String>>) {
        match columns {
            Some(columns) => {
                self.eager.insert(path.to_string(), Some(columns));
            }
            None => {
                self.eager.entry(path.to_string()).or_insert(None);
            }
        }
    }

    fn with_count(&mut self, relation: &str, alias: &str) {
        if let Some(query) = self.aggregate_subquery(relation, Expr::col(Asterisk).count()) {
            let sql = query.to_string(PostgresQueryBuilder);
            self.aggregates.push((Expr::cust(format!("({sql})")), alias.to_string()));
        }
    }

    fn with_exists(&mut self, relation: &str, alias: &str) {
        if let Some(query) = self.aggregate_subquery(relation, Expr::cust("1")) {
            let sql = query.to_string(PostgresQueryBuilder);
            self.aggregates
                .push((Expr::cust(format!("EXISTS ({sql})")), alias.to_string()));
        }
    }

    fn with_aggregate(&mut self, relation: &str, column: &str, function: Aggregate, alias: &str) {
        let Ok(related) = self
            .registry
            .relation(&self.model, relation)
            .and_then(|r| self.registry.model(&r.related))
        else {
            tracing::warn!(relation, "skipping aggregate on unknown relation");
            return;
        };
        let select = Expr::cust(format!(
            "{}(\"{}\".\"{column}\")",
            function.as_str().to_uppercase(),
            related.table()
        ));
        if let Some(query) = self.aggregate_subquery(relation, select) {
            let sql = query.to_string(PostgresQueryBuilder);
            self.aggregates.push((Expr::cust(format!("({sql})")), alias.to_string()));
        }
    }

    fn order_by(&mut self, column: &str, direction: SortDirection) {
        let order = match direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        let expr = if self.aggregates.iter().any(|(_, alias)| alias == column) {
            Expr::cust(format!("\"{column}\""))
        } else {
            self.column_expr(column)
        };
        self.orders.push((expr, order));
    }
}
