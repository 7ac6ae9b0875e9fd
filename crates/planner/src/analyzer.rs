use arrow_schema::{DataType, Field, Schema};
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName, Query,
    Select, SelectItem, SetExpr, TableFactor, TableWithJoins, UnaryOperator, Value,
};

use csql_catalog::{MetaStore, SourceKind};
use csql_common::{CsqlError, Result};

use crate::analysis::{Analysis, AnalyzedSource, JoinClause, SinkSpec};
use crate::logical_plan::{AggExpr, BinaryOp, Expr, JoinType, LiteralValue};

/// Statement semantic analyzer.
///
/// Consumes the parsed query tree plus a catalog snapshot and emits the
/// resolved [`Analysis`] for planning.
///
/// Guarantees:
/// - every table, column, and function reference is resolved against the
///   snapshot, or analysis fails naming the reference;
/// - expression types are inferred and required casts inserted;
/// - scalar function calls are bound to a concrete registry overload;
/// - the snapshot is only read, never mutated, so analysis is pure and
///   repeatable for a given statement + snapshot.
///
/// Error taxonomy:
/// - `UnresolvedReference` / `AmbiguousReference`: name resolution failures
/// - `Planning`: type errors and statement shapes outside the supported subset
#[derive(Debug, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one continuous query that will publish into `sink_name`.
    pub fn analyze(
        &self,
        query: &Query,
        metastore: &MetaStore,
        sink_name: &str,
    ) -> Result<Analysis> {
        let select = unwrap_select(query)?;

        if query.limit.is_some() {
            return Err(CsqlError::Planning(
                "LIMIT is not supported on continuous queries".to_string(),
            ));
        }
        if query.order_by.is_some() {
            return Err(CsqlError::Planning(
                "ORDER BY is not supported on continuous queries".to_string(),
            ));
        }
        if select.having.is_some() {
            return Err(CsqlError::Planning(
                "HAVING is not supported".to_string(),
            ));
        }

        let (sources, join) = self.analyze_from(&select.from, metastore)?;
        let resolver = Resolver::from_sources(&sources);

        let join = match join {
            Some(raw) => Some(self.analyze_join(raw, &resolver)?),
            None => None,
        };

        let filter = match &select.selection {
            Some(pred) => {
                let (expr, dt) = self.analyze_expr(pred, &resolver, metastore)?;
                if dt != DataType::Boolean {
                    return Err(CsqlError::Planning(
                        "WHERE predicate must be boolean".to_string(),
                    ));
                }
                Some(expr)
            }
            None => None,
        };

        let group_exprs = self.analyze_group_by(&select.group_by, &resolver, metastore)?;

        let mut aggr_exprs: Vec<(AggExpr, String)> = vec![];
        let mut scalar_items: Vec<(Expr, String)> = vec![];
        let mut item_order: Vec<SelectSlot> = vec![];

        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    if !group_exprs.is_empty() {
                        return Err(CsqlError::Planning(
                            "SELECT * cannot be combined with GROUP BY".to_string(),
                        ));
                    }
                    for (idx, field) in resolver.all_fields().into_iter().enumerate() {
                        scalar_items.push((
                            Expr::ColumnRef {
                                name: field.name().clone(),
                                index: idx,
                            },
                            field.name().clone(),
                        ));
                        item_order.push(SelectSlot::Scalar(scalar_items.len() - 1));
                    }
                }
                SelectItem::QualifiedWildcard(_, _) => {
                    return Err(CsqlError::Planning(
                        "qualified wildcards are not supported".to_string(),
                    ))
                }
                SelectItem::UnnamedExpr(e) => {
                    self.analyze_select_item(
                        e,
                        None,
                        &resolver,
                        metastore,
                        &mut aggr_exprs,
                        &mut scalar_items,
                        &mut item_order,
                    )?;
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    self.analyze_select_item(
                        expr,
                        Some(alias.value.clone()),
                        &resolver,
                        metastore,
                        &mut aggr_exprs,
                        &mut scalar_items,
                        &mut item_order,
                    )?;
                }
            }
        }

        if scalar_items.is_empty() && aggr_exprs.is_empty() {
            return Err(CsqlError::Planning(
                "SELECT list cannot be empty".to_string(),
            ));
        }

        let aggregating = !aggr_exprs.is_empty() || !group_exprs.is_empty();
        if aggregating {
            self.finish_aggregating(
                sources,
                join,
                filter,
                group_exprs,
                aggr_exprs,
                scalar_items,
                item_order,
                &resolver,
                sink_name,
            )
        } else {
            self.finish_stateless(sources, join, filter, scalar_items, sink_name)
        }
    }

    // -------------------------
    // FROM / JOIN resolution
    // -------------------------

    fn analyze_from(
        &self,
        from: &[TableWithJoins],
        metastore: &MetaStore,
    ) -> Result<(Vec<AnalyzedSource>, Option<RawJoin>)> {
        if from.len() != 1 {
            return Err(CsqlError::Planning(
                "exactly one FROM clause source is required".to_string(),
            ));
        }
        let twj: &TableWithJoins = &from[0];

        let mut sources = vec![self.resolve_table_factor(&twj.relation, metastore)?];

        if twj.joins.len() > 1 {
            return Err(CsqlError::Planning(
                "at most one JOIN is supported".to_string(),
            ));
        }

        let mut raw_join = None;
        if let Some(join) = twj.joins.first() {
            sources.push(self.resolve_table_factor(&join.relation, metastore)?);
            let (join_type, constraint) = match &join.join_operator {
                JoinOperator::Inner(c) => (JoinType::Inner, c),
                JoinOperator::LeftOuter(c) => (JoinType::Left, c),
                JoinOperator::FullOuter(c) => (JoinType::Full, c),
                other => {
                    return Err(CsqlError::Planning(format!(
                        "unsupported join operator: {other:?}"
                    )))
                }
            };
            let on = match constraint {
                JoinConstraint::On(e) => e,
                _ => {
                    return Err(CsqlError::Planning(
                        "JOIN requires an ON clause".to_string(),
                    ))
                }
            };
            raw_join = Some(RawJoin {
                join_type,
                on: on.clone(),
            });
        }

        Ok((sources, raw_join))
    }

    fn resolve_table_factor(
        &self,
        tf: &TableFactor,
        metastore: &MetaStore,
    ) -> Result<AnalyzedSource> {
        match tf {
            TableFactor::Table { name, alias, .. } => {
                let source_name = object_name_to_string(name);
                let source = metastore.get_source(&source_name).ok_or_else(|| {
                    CsqlError::UnresolvedReference(format!("source {source_name}"))
                })?;
                let alias = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_else(|| source_name.clone());
                Ok(AnalyzedSource { source, alias })
            }
            _ => Err(CsqlError::Planning(
                "only plain source names are supported in FROM".to_string(),
            )),
        }
    }

    fn analyze_join(&self, raw: RawJoin, resolver: &Resolver) -> Result<JoinClause> {
        let (left_ref, right_ref) = equi_join_pair(&raw.on)?;

        let left = resolver.resolve_column(&left_ref)?;
        let right = resolver.resolve_column(&right_ref)?;
        let (left, right) = if left.relation == 0 && right.relation == 1 {
            (left, right)
        } else if left.relation == 1 && right.relation == 0 {
            (right, left)
        } else {
            return Err(CsqlError::Planning(
                "join condition must compare one column from each side".to_string(),
            ));
        };

        if !types_compatible_for_equality(&left.data_type, &right.data_type) {
            return Err(CsqlError::Planning(format!(
                "join key type mismatch: {}({}) vs {}({})",
                left.name, left.data_type, right.name, right.data_type
            )));
        }

        Ok(JoinClause {
            join_type: raw.join_type,
            left_key: left.name,
            right_key: right.name,
        })
    }

    // -------------------------
    // SELECT list
    // -------------------------

    #[allow(clippy::too_many_arguments)]
    fn analyze_select_item(
        &self,
        e: &SqlExpr,
        alias: Option<String>,
        resolver: &Resolver,
        metastore: &MetaStore,
        aggr_exprs: &mut Vec<(AggExpr, String)>,
        scalar_items: &mut Vec<(Expr, String)>,
        item_order: &mut Vec<SelectSlot>,
    ) -> Result<()> {
        if let Some((agg, default_name)) = self.try_analyze_agg(e, resolver, metastore)? {
            let name = alias.unwrap_or_else(|| default_name.to_string());
            aggr_exprs.push((agg, name));
            item_order.push(SelectSlot::Aggregate(aggr_exprs.len() - 1));
        } else {
            let (expr, _dt) = self.analyze_expr(e, resolver, metastore)?;
            let name = alias.unwrap_or_else(|| expr_name_fallback(&expr));
            scalar_items.push((expr, name));
            item_order.push(SelectSlot::Scalar(scalar_items.len() - 1));
        }
        Ok(())
    }

    fn try_analyze_agg(
        &self,
        e: &SqlExpr,
        resolver: &Resolver,
        metastore: &MetaStore,
    ) -> Result<Option<(AggExpr, &'static str)>> {
        let func = match e {
            SqlExpr::Function(f) => f,
            _ => return Ok(None),
        };
        let fname = object_name_to_string(&func.name).to_ascii_uppercase();
        if !matches!(fname.as_str(), "COUNT" | "SUM" | "MIN" | "MAX" | "AVG") {
            return Ok(None);
        }

        let arg = single_function_arg(func, &fname)?;
        let (arg, default_name) = match (fname.as_str(), arg) {
            ("COUNT", AggArg::Wildcard) => (Expr::Literal(LiteralValue::Int64(1)), "count"),
            (_, AggArg::Wildcard) => {
                return Err(CsqlError::Planning(format!(
                    "{fname}(*) is not supported"
                )))
            }
            ("COUNT", AggArg::Expr(e)) => {
                let (ae, _dt) = self.analyze_expr(e, resolver, metastore)?;
                (ae, "count")
            }
            (_, AggArg::Expr(e)) => {
                let (ae, dt) = self.analyze_expr(e, resolver, metastore)?;
                match fname.as_str() {
                    "SUM" | "AVG" if !is_numeric(&dt) => {
                        return Err(CsqlError::Planning(format!(
                            "{fname}() requires a numeric argument"
                        )))
                    }
                    _ => {}
                }
                let name = match fname.as_str() {
                    "SUM" => "sum",
                    "MIN" => "min",
                    "MAX" => "max",
                    _ => "avg",
                };
                (ae, name)
            }
        };

        let agg = match fname.as_str() {
            "COUNT" => AggExpr::Count(arg),
            "SUM" => AggExpr::Sum(arg),
            "MIN" => AggExpr::Min(arg),
            "MAX" => AggExpr::Max(arg),
            _ => AggExpr::Avg(arg),
        };
        Ok(Some((agg, default_name)))
    }

    fn analyze_group_by(
        &self,
        group_by: &GroupByExpr,
        resolver: &Resolver,
        metastore: &MetaStore,
    ) -> Result<Vec<Expr>> {
        let exprs = match group_by {
            GroupByExpr::Expressions(es, _mods) => es,
            GroupByExpr::All(_mods) => {
                return Err(CsqlError::Planning(
                    "GROUP BY ALL is not supported".to_string(),
                ))
            }
        };
        if exprs.is_empty() {
            return Ok(vec![]);
        }
        if exprs.len() > 1 {
            return Err(CsqlError::Planning(
                "grouping by more than one column is not supported".to_string(),
            ));
        }
        let (expr, _dt) = self.analyze_expr(&exprs[0], resolver, metastore)?;
        if !matches!(expr, Expr::ColumnRef { .. }) {
            return Err(CsqlError::Planning(
                "GROUP BY expression must be a plain column".to_string(),
            ));
        }
        Ok(vec![expr])
    }

    // -------------------------
    // Expression analysis
    // -------------------------

    fn analyze_expr(
        &self,
        e: &SqlExpr,
        resolver: &Resolver,
        metastore: &MetaStore,
    ) -> Result<(Expr, DataType)> {
        match e {
            SqlExpr::Identifier(id) => {
                let col = resolver.resolve_column(&id.value)?;
                Ok((
                    Expr::ColumnRef {
                        name: col.name,
                        index: col.index,
                    },
                    col.data_type,
                ))
            }
            SqlExpr::CompoundIdentifier(parts) => {
                let qualified = compound_ident_to_string(parts);
                let col = resolver.resolve_column(&qualified)?;
                Ok((
                    Expr::ColumnRef {
                        name: col.name,
                        index: col.index,
                    },
                    col.data_type,
                ))
            }
            SqlExpr::Value(v) => {
                let lit = sql_value_to_literal(v)?;
                let dt = literal_type(&lit);
                Ok((Expr::Literal(lit), dt))
            }
            SqlExpr::Nested(inner) => self.analyze_expr(inner, resolver, metastore),
            SqlExpr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => {
                let (ae, dt) = self.analyze_expr(expr, resolver, metastore)?;
                if dt != DataType::Boolean {
                    return Err(CsqlError::Planning(
                        "NOT requires a boolean operand".to_string(),
                    ));
                }
                Ok((Expr::Not(Box::new(ae)), DataType::Boolean))
            }
            SqlExpr::UnaryOp { op, .. } => Err(CsqlError::Planning(format!(
                "unsupported unary operator: {op}"
            ))),
            SqlExpr::BinaryOp { left, op, right } => {
                if *op == SqlBinaryOp::And || *op == SqlBinaryOp::Or {
                    let (al, ldt) = self.analyze_expr(left, resolver, metastore)?;
                    let (ar, rdt) = self.analyze_expr(right, resolver, metastore)?;
                    if ldt != DataType::Boolean || rdt != DataType::Boolean {
                        return Err(CsqlError::Planning(format!(
                            "{op} requires boolean operands"
                        )));
                    }
                    let combined = if *op == SqlBinaryOp::And {
                        Expr::And(Box::new(al), Box::new(ar))
                    } else {
                        Expr::Or(Box::new(al), Box::new(ar))
                    };
                    return Ok((combined, DataType::Boolean));
                }

                let (al, ldt) = self.analyze_expr(left, resolver, metastore)?;
                let (ar, rdt) = self.analyze_expr(right, resolver, metastore)?;
                let bop = sql_binop_to_binop(op)?;
                match bop {
                    BinaryOp::Eq
                    | BinaryOp::NotEq
                    | BinaryOp::Lt
                    | BinaryOp::LtEq
                    | BinaryOp::Gt
                    | BinaryOp::GtEq => {
                        let (cl, cr, _common) = coerce_for_compare(al, ldt, ar, rdt)?;
                        Ok((
                            Expr::BinaryOp {
                                left: Box::new(cl),
                                op: bop,
                                right: Box::new(cr),
                            },
                            DataType::Boolean,
                        ))
                    }
                    BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                        let (cl, cr, out) = coerce_for_arith(bop, al, ldt, ar, rdt)?;
                        Ok((
                            Expr::BinaryOp {
                                left: Box::new(cl),
                                op: bop,
                                right: Box::new(cr),
                            },
                            out,
                        ))
                    }
                }
            }
            SqlExpr::Function(func) => self.analyze_function_call(func, resolver, metastore),
            _ => Err(CsqlError::Planning(format!(
                "unsupported SQL expression: {e}"
            ))),
        }
    }

    /// Bind a scalar function call to a concrete registry overload.
    fn analyze_function_call(
        &self,
        func: &sqlparser::ast::Function,
        resolver: &Resolver,
        metastore: &MetaStore,
    ) -> Result<(Expr, DataType)> {
        let name = object_name_to_string(&func.name).to_ascii_lowercase();

        let mut args = vec![];
        let mut arg_types = vec![];
        if let FunctionArguments::List(list) = &func.args {
            for arg in &list.args {
                let e = match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => e,
                    _ => {
                        return Err(CsqlError::Planning(format!(
                            "unsupported argument form in call to {name}"
                        )))
                    }
                };
                let (ae, dt) = self.analyze_expr(e, resolver, metastore)?;
                args.push(ae);
                arg_types.push(dt);
            }
        }

        let callable = metastore.functions().resolve(&name, &arg_types)?;
        let signature = callable.signature();

        // Cast call-site argument types up to the resolved overload's declared
        // types so the runtime lookup is an exact match.
        let args = args
            .into_iter()
            .zip(arg_types.iter().zip(signature.arg_types.iter()))
            .map(|(a, (from, to))| cast_if_needed(a, from, to))
            .collect();

        Ok((
            Expr::FunctionCall {
                name,
                args,
                arg_types: signature.arg_types.clone(),
                return_type: signature.return_type.clone(),
            },
            signature.return_type.clone(),
        ))
    }

    // -------------------------
    // Output shaping
    // -------------------------

    #[allow(clippy::too_many_arguments)]
    fn finish_aggregating(
        &self,
        sources: Vec<AnalyzedSource>,
        join: Option<JoinClause>,
        filter: Option<Expr>,
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        scalar_items: Vec<(Expr, String)>,
        item_order: Vec<SelectSlot>,
        resolver: &Resolver,
        sink_name: &str,
    ) -> Result<Analysis> {
        let group_col = match group_exprs.first() {
            Some(Expr::ColumnRef { name, index }) => (name.clone(), *index),
            _ => {
                return Err(CsqlError::Planning(
                    "aggregate queries require a GROUP BY column".to_string(),
                ))
            }
        };

        // Non-aggregate select items must be the grouping column.
        for (expr, _name) in &scalar_items {
            match expr {
                Expr::ColumnRef { index, .. } if *index == group_col.1 => {}
                _ => {
                    return Err(CsqlError::Planning(format!(
                        "non-aggregate SELECT expression must appear in GROUP BY: {}",
                        expr_name_fallback(expr)
                    )))
                }
            }
        }

        // Aggregate operator output: group column first, then one field per
        // aggregate, in select-list order.
        let group_field = resolver.field_at(group_col.1)?;
        let mut agg_fields = vec![Field::new(
            group_field.name(),
            group_field.data_type().clone(),
            true,
        )];
        for (agg, name) in &aggr_exprs {
            agg_fields.push(Field::new(name, agg_return_type(agg, resolver)?, true));
        }
        let agg_schema = Schema::new(agg_fields);

        // Rewrite the select list into aggregate-output coordinates.
        let mut select_exprs: Vec<(Expr, String)> = vec![];
        let mut out_fields: Vec<Field> = vec![];
        let mut key_field: Option<String> = None;
        for slot in item_order {
            match slot {
                SelectSlot::Scalar(i) => {
                    let (_, out_name) = &scalar_items[i];
                    select_exprs.push((
                        Expr::ColumnRef {
                            name: group_field.name().clone(),
                            index: 0,
                        },
                        out_name.clone(),
                    ));
                    out_fields.push(Field::new(
                        out_name,
                        group_field.data_type().clone(),
                        true,
                    ));
                    key_field = Some(out_name.clone());
                }
                SelectSlot::Aggregate(i) => {
                    let (_, agg_name) = &aggr_exprs[i];
                    let agg_index = 1 + i;
                    select_exprs.push((
                        Expr::ColumnRef {
                            name: agg_name.clone(),
                            index: agg_index,
                        },
                        agg_name.clone(),
                    ));
                    out_fields.push(agg_schema.field(agg_index).clone());
                }
            }
        }

        // Keyed by the grouping column even when it is not projected.
        let key_field = key_field.or_else(|| Some(group_field.name().clone()));

        Ok(Analysis {
            sources,
            join,
            filter,
            select_exprs,
            group_exprs,
            aggr_exprs,
            agg_schema: Some(agg_schema),
            sink: SinkSpec {
                name: sink_name.to_string(),
                kind: SourceKind::Table,
            },
            schema: Schema::new(out_fields),
            key_field,
        })
    }

    fn finish_stateless(
        &self,
        sources: Vec<AnalyzedSource>,
        join: Option<JoinClause>,
        filter: Option<Expr>,
        scalar_items: Vec<(Expr, String)>,
        sink_name: &str,
    ) -> Result<Analysis> {
        let resolver = Resolver::from_sources(&sources);
        let mut out_fields = vec![];
        for (expr, name) in &scalar_items {
            out_fields.push(Field::new(name, expr_type(expr, &resolver)?, true));
        }

        // The output stays keyed by the leftmost source's key (or the join
        // key) when the projection retains that column.
        let carried_key = match &join {
            Some(j) => Some(j.left_key.clone()),
            None => sources[0].source.key_field.clone(),
        };
        let key_field = carried_key.and_then(|key| {
            scalar_items.iter().find_map(|(expr, name)| match expr {
                Expr::ColumnRef { name: col, .. } if *col == key => Some(name.clone()),
                _ => None,
            })
        });

        Ok(Analysis {
            sources,
            join,
            filter,
            select_exprs: scalar_items,
            group_exprs: vec![],
            aggr_exprs: vec![],
            agg_schema: None,
            sink: SinkSpec {
                name: sink_name.to_string(),
                kind: SourceKind::Stream,
            },
            schema: Schema::new(out_fields),
            key_field,
        })
    }
}

// -------------------------
// Resolver (name -> idx, dt)
// -------------------------

#[derive(Debug, Clone)]
struct Relation {
    name: String,
    fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub(crate) struct Resolver {
    relations: Vec<Relation>,
}

#[derive(Debug, Clone)]
struct ResolvedColumn {
    /// Index into the concatenated FROM schemas.
    index: usize,
    /// Which relation the column came from.
    relation: usize,
    /// Plain (unqualified) field name.
    name: String,
    data_type: DataType,
}

impl Resolver {
    fn from_sources(sources: &[AnalyzedSource]) -> Self {
        Self {
            relations: sources
                .iter()
                .map(|s| Relation {
                    name: s.alias.clone(),
                    fields: s
                        .source
                        .schema
                        .fields()
                        .iter()
                        .map(|f| f.as_ref().clone())
                        .collect(),
                })
                .collect(),
        }
    }

    fn all_fields(&self) -> Vec<&Field> {
        self.relations
            .iter()
            .flat_map(|r| r.fields.iter())
            .collect()
    }

    fn field_at(&self, idx: usize) -> Result<&Field> {
        let mut base = 0usize;
        for r in &self.relations {
            if idx < base + r.fields.len() {
                return Ok(&r.fields[idx - base]);
            }
            base += r.fields.len();
        }
        Err(CsqlError::Planning(format!(
            "column index out of range: {idx}"
        )))
    }

    fn resolve_column(&self, col: &str) -> Result<ResolvedColumn> {
        let (rel_opt, name) = split_qual(col);

        let mut found: Vec<ResolvedColumn> = vec![];
        let mut base = 0usize;

        for (rel_idx, r) in self.relations.iter().enumerate() {
            let rel_match = match rel_opt {
                Some(rel) => r.name == rel,
                None => true,
            };
            if rel_match {
                for (i, f) in r.fields.iter().enumerate() {
                    if f.name() == name {
                        found.push(ResolvedColumn {
                            index: base + i,
                            relation: rel_idx,
                            name: f.name().clone(),
                            data_type: f.data_type().clone(),
                        });
                    }
                }
            }
            base += r.fields.len();
        }

        match found.len() {
            0 => Err(CsqlError::UnresolvedReference(format!("column {col}"))),
            1 => Ok(found.remove(0)),
            _ => Err(CsqlError::AmbiguousReference(format!(
                "column {col} (qualify with an alias)"
            ))),
        }
    }
}

enum SelectSlot {
    Scalar(usize),
    Aggregate(usize),
}

struct RawJoin {
    join_type: JoinType,
    on: SqlExpr,
}

enum AggArg<'a> {
    Expr(&'a SqlExpr),
    Wildcard,
}

// -------------------------
// AST helpers
// -------------------------

fn unwrap_select(query: &Query) -> Result<&Select> {
    match &*query.body {
        SetExpr::Select(s) => Ok(s.as_ref()),
        _ => Err(CsqlError::Planning(
            "only simple SELECT is supported (no UNION/EXCEPT/INTERSECT)".to_string(),
        )),
    }
}

fn equi_join_pair(on: &SqlExpr) -> Result<(String, String)> {
    match on {
        SqlExpr::BinaryOp { left, op, right } if *op == SqlBinaryOp::Eq => {
            Ok((ident_expr_to_col(left)?, ident_expr_to_col(right)?))
        }
        SqlExpr::Nested(inner) => equi_join_pair(inner),
        _ => Err(CsqlError::Planning(
            "JOIN ... ON must be a single key equality (a = b)".to_string(),
        )),
    }
}

fn ident_expr_to_col(e: &SqlExpr) -> Result<String> {
    match e {
        SqlExpr::Identifier(id) => Ok(id.value.clone()),
        SqlExpr::CompoundIdentifier(parts) => Ok(compound_ident_to_string(parts)),
        _ => Err(CsqlError::Planning(
            "JOIN keys must be column identifiers".to_string(),
        )),
    }
}

fn single_function_arg<'a>(
    func: &'a sqlparser::ast::Function,
    fname: &str,
) -> Result<AggArg<'a>> {
    let list = match &func.args {
        FunctionArguments::List(list) => list,
        _ => {
            return Err(CsqlError::Planning(format!(
                "{fname}() requires one argument"
            )))
        }
    };
    if list.args.len() != 1 {
        return Err(CsqlError::Planning(format!(
            "{fname}() requires exactly one argument"
        )));
    }
    match &list.args[0] {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Ok(AggArg::Expr(e)),
        FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => Ok(AggArg::Wildcard),
        _ => Err(CsqlError::Planning(format!(
            "unsupported argument form in {fname}()"
        ))),
    }
}

fn sql_value_to_literal(v: &Value) -> Result<LiteralValue> {
    match v {
        Value::Number(s, _) => {
            if s.contains('.') {
                let f: f64 = s
                    .parse()
                    .map_err(|_| CsqlError::Planning(format!("bad number: {s}")))?;
                Ok(LiteralValue::Float64(f))
            } else {
                let i: i64 = s
                    .parse()
                    .map_err(|_| CsqlError::Planning(format!("bad number: {s}")))?;
                Ok(LiteralValue::Int64(i))
            }
        }
        Value::SingleQuotedString(s) => Ok(LiteralValue::Utf8(s.clone())),
        Value::Boolean(b) => Ok(LiteralValue::Boolean(*b)),
        Value::Null => Ok(LiteralValue::Null),
        _ => Err(CsqlError::Planning(format!(
            "unsupported SQL literal: {v}"
        ))),
    }
}

fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn compound_ident_to_string(parts: &[Ident]) -> String {
    parts
        .iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn sql_binop_to_binop(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        _ => {
            return Err(CsqlError::Planning(format!(
                "unsupported binary operator: {op}"
            )))
        }
    })
}

fn expr_name_fallback(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.clone(),
        Expr::ColumnRef { name, .. } => name.clone(),
        Expr::FunctionCall { name, .. } => name.clone(),
        Expr::Literal(_) => "lit".to_string(),
        _ => "expr".to_string(),
    }
}

fn agg_return_type(agg: &AggExpr, resolver: &Resolver) -> Result<DataType> {
    Ok(match agg {
        AggExpr::Count(_) => DataType::Int64,
        AggExpr::Sum(e) | AggExpr::Min(e) | AggExpr::Max(e) => expr_type(e, resolver)?,
        AggExpr::Avg(_) => DataType::Float64,
    })
}

/// Type of an already-analyzed expression.
fn expr_type(e: &Expr, resolver: &Resolver) -> Result<DataType> {
    Ok(match e {
        Expr::ColumnRef { index, .. } => resolver.field_at(*index)?.data_type().clone(),
        Expr::Column(name) => {
            return Err(CsqlError::Planning(format!(
                "unresolved column escaped analysis: {name}"
            )))
        }
        Expr::Literal(v) => literal_type(v),
        Expr::Cast { to_type, .. } => to_type.clone(),
        Expr::And(_, _) | Expr::Or(_, _) | Expr::Not(_) => DataType::Boolean,
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => DataType::Boolean,
            BinaryOp::Divide => DataType::Float64,
            _ => {
                let l = expr_type(left, resolver)?;
                let r = expr_type(right, resolver)?;
                wider_numeric(&l, &r).ok_or_else(|| {
                    CsqlError::Planning("arithmetic requires numeric operands".to_string())
                })?
            }
        },
        Expr::FunctionCall { return_type, .. } => return_type.clone(),
    })
}

fn split_qual(s: &str) -> (Option<&str>, &str) {
    match s.rsplit_once('.') {
        Some((a, b)) => (Some(a), b),
        None => (None, s),
    }
}

// -------------------------
// Type inference + casts
// -------------------------

pub(crate) fn literal_type(v: &LiteralValue) -> DataType {
    match v {
        // Integer literals type as INT when they fit, else BIGINT, so calls
        // like f(21) resolve against INT parameters without an explicit cast.
        LiteralValue::Int64(i) => {
            if i32::try_from(*i).is_ok() {
                DataType::Int32
            } else {
                DataType::Int64
            }
        }
        LiteralValue::Float64(_) => DataType::Float64,
        LiteralValue::Utf8(_) => DataType::Utf8,
        LiteralValue::Boolean(_) => DataType::Boolean,
        LiteralValue::Null => DataType::Null,
    }
}

pub(crate) fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int32 | DataType::Int64 | DataType::Float64
    )
}

fn numeric_rank(dt: &DataType) -> Option<u8> {
    Some(match dt {
        DataType::Int32 => 1,
        DataType::Int64 => 2,
        DataType::Float64 => 3,
        _ => return None,
    })
}

fn wider_numeric(a: &DataType, b: &DataType) -> Option<DataType> {
    let ra = numeric_rank(a)?;
    let rb = numeric_rank(b)?;
    if ra >= rb {
        Some(a.clone())
    } else {
        Some(b.clone())
    }
}

fn cast_if_needed(expr: Expr, from: &DataType, to: &DataType) -> Expr {
    if from == to {
        expr
    } else {
        Expr::Cast {
            expr: Box::new(expr),
            to_type: to.clone(),
        }
    }
}

fn coerce_for_compare(
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr, DataType)> {
    // Null can be cast to the other side.
    if ldt == DataType::Null {
        return Ok((cast_if_needed(left, &ldt, &rdt), right, rdt));
    }
    if rdt == DataType::Null {
        return Ok((left, cast_if_needed(right, &rdt, &ldt), ldt));
    }

    if is_numeric(&ldt) && is_numeric(&rdt) {
        let target = wider_numeric(&ldt, &rdt).ok_or_else(|| {
            CsqlError::Planning("failed to determine numeric widening type".to_string())
        })?;
        return Ok((
            cast_if_needed(left, &ldt, &target),
            cast_if_needed(right, &rdt, &target),
            target,
        ));
    }

    if ldt == rdt {
        return Ok((left, right, ldt));
    }

    Err(CsqlError::Planning(format!(
        "cannot compare types {ldt} and {rdt}"
    )))
}

fn coerce_for_arith(
    op: BinaryOp,
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr, DataType)> {
    if !is_numeric(&ldt) || !is_numeric(&rdt) {
        return Err(CsqlError::Planning(
            "arithmetic requires numeric operands".to_string(),
        ));
    }

    // Division produces float.
    if op == BinaryOp::Divide {
        let target = DataType::Float64;
        return Ok((
            cast_if_needed(left, &ldt, &target),
            cast_if_needed(right, &rdt, &target),
            target,
        ));
    }

    let target = wider_numeric(&ldt, &rdt)
        .ok_or_else(|| CsqlError::Planning("failed numeric widening".to_string()))?;
    Ok((
        cast_if_needed(left, &ldt, &target),
        cast_if_needed(right, &rdt, &target),
        target,
    ))
}

fn types_compatible_for_equality(a: &DataType, b: &DataType) -> bool {
    a == b || (is_numeric(a) && is_numeric(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field, Schema};
    use csql_catalog::{DataSource, MetaStore, SourceKind};

    fn store_with_orders() -> MetaStore {
        let store = MetaStore::new();
        store.put_source(DataSource::new(
            "orders",
            Schema::new(vec![
                Field::new("order_id", DataType::Int64, false),
                Field::new("item", DataType::Utf8, true),
                Field::new("amount", DataType::Float64, true),
            ]),
            Some("order_id".to_string()),
            SourceKind::Stream,
            "orders",
        ));
        store.put_source(DataSource::new(
            "items",
            Schema::new(vec![
                Field::new("item", DataType::Utf8, false),
                Field::new("category", DataType::Utf8, true),
            ]),
            Some("item".to_string()),
            SourceKind::Table,
            "items",
        ));
        store
    }

    fn analyze(sql: &str, store: &MetaStore) -> csql_common::Result<Analysis> {
        let query = csql_sql::parse_single_query(sql).unwrap();
        Analyzer::new().analyze(&query, store, "out")
    }

    #[test]
    fn projection_schema_matches_declared_source() {
        let store = store_with_orders();
        let analysis = analyze("SELECT order_id, amount FROM orders", &store).unwrap();
        let names: Vec<_> = analysis
            .schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["order_id", "amount"]);
        assert_eq!(analysis.key_field.as_deref(), Some("order_id"));
        assert_eq!(analysis.sink.kind, SourceKind::Stream);
    }

    #[test]
    fn select_star_expands_source_schema() {
        let store = store_with_orders();
        let analysis = analyze("SELECT * FROM orders", &store).unwrap();
        assert_eq!(analysis.schema.fields().len(), 3);
    }

    #[test]
    fn missing_source_is_unresolved_and_named() {
        let store = store_with_orders();
        let err = analyze("SELECT a FROM nope", &store).unwrap_err();
        match err {
            CsqlError::UnresolvedReference(msg) => assert!(msg.contains("nope"), "msg={msg}"),
            other => panic!("expected UnresolvedReference, got {other}"),
        }
    }

    #[test]
    fn missing_column_is_unresolved() {
        let store = store_with_orders();
        let err = analyze("SELECT no_such FROM orders", &store).unwrap_err();
        assert!(matches!(err, CsqlError::UnresolvedReference(_)));
    }

    #[test]
    fn unqualified_shared_column_is_ambiguous() {
        let store = store_with_orders();
        let err = analyze(
            "SELECT item FROM orders JOIN items ON orders.item = items.item",
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, CsqlError::AmbiguousReference(_)));
    }

    #[test]
    fn qualified_join_columns_resolve() {
        let store = store_with_orders();
        let analysis = analyze(
            "SELECT orders.order_id, items.category FROM orders JOIN items ON orders.item = items.item",
            &store,
        )
        .unwrap();
        let join = analysis.join.unwrap();
        assert_eq!(join.left_key, "item");
        assert_eq!(join.right_key, "item");
        assert_eq!(join.join_type, JoinType::Inner);
    }

    #[test]
    fn group_by_produces_table_output_keyed_by_group_column() {
        let store = store_with_orders();
        let analysis = analyze(
            "SELECT item, COUNT(*) AS orders_placed FROM orders GROUP BY item",
            &store,
        )
        .unwrap();
        assert!(analysis.is_aggregating());
        assert_eq!(analysis.sink.kind, SourceKind::Table);
        assert_eq!(analysis.key_field.as_deref(), Some("item"));
        let agg = analysis.agg_schema.unwrap();
        assert_eq!(agg.field(0).name(), "item");
        assert_eq!(agg.field(1).name(), "orders_placed");
        assert_eq!(agg.field(1).data_type(), &DataType::Int64);
    }

    #[test]
    fn non_grouped_scalar_item_is_rejected() {
        let store = store_with_orders();
        let err = analyze(
            "SELECT amount, COUNT(*) FROM orders GROUP BY item",
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, CsqlError::Planning(_)));
    }

    #[test]
    fn unknown_function_is_unresolved() {
        let store = store_with_orders();
        let err = analyze("SELECT no_fn(amount) FROM orders", &store).unwrap_err();
        assert!(matches!(err, CsqlError::UnresolvedReference(_)));
    }

    #[test]
    fn builtin_call_binds_return_type() {
        let store = store_with_orders();
        let analysis = analyze("SELECT ucase(item) AS loud FROM orders", &store).unwrap();
        assert_eq!(analysis.schema.field(0).data_type(), &DataType::Utf8);
        match &analysis.select_exprs[0].0 {
            Expr::FunctionCall { name, return_type, .. } => {
                assert_eq!(name, "ucase");
                assert_eq!(return_type, &DataType::Utf8);
            }
            other => panic!("expected function call, got {other:?}"),
        }
    }

    #[test]
    fn analysis_is_pure_and_repeatable() {
        let store = store_with_orders();
        let a = analyze("SELECT order_id FROM orders", &store).unwrap();
        let b = analyze("SELECT order_id FROM orders", &store).unwrap();
        assert_eq!(a.schema, b.schema);
        assert_eq!(store.source_names(), vec!["items", "orders"]);
    }

    #[test]
    fn limit_is_rejected_on_continuous_queries() {
        let store = store_with_orders();
        let err = analyze("SELECT order_id FROM orders LIMIT 5", &store).unwrap_err();
        assert!(matches!(err, CsqlError::Planning(_)));
    }
}
