//! Query command implementation.

use crate::workspace::{CliError, Workspace};
use kvdex_core::{Direction, PlanDecision, Predicate, SelectQuery};
use serde::Serialize;

/// Planner output for one query.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Target table.
    pub table: String,
    /// `indexed`, `direct-lookup` or `not-indexable`.
    pub decision: &'static str,
    /// Why the index was not used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Buckets the plan reads.
    pub lookups: Vec<String>,
    /// Ordered primary keys; absent when the source must answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    /// WHERE restriction for the source query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriction: Option<String>,
    /// ORDER BY tie-break for the source query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

/// Parses `field=value` into an equality.
pub fn parse_condition(condition: &str) -> Result<Predicate, CliError> {
    let (field, value) = condition
        .split_once('=')
        .ok_or_else(|| CliError::Argument(format!("expected field=value, got {condition:?}")))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(CliError::Argument(format!("missing field in {condition:?}")));
    }
    Ok(Predicate::eq(field, value.trim()))
}

/// Parses `field` or `field:asc|desc`.
pub fn parse_order(item: &str) -> Result<(String, Direction), CliError> {
    match item.rsplit_once(':') {
        Some((field, dir)) if dir.eq_ignore_ascii_case("desc") => Ok((field.to_string(), Direction::Desc)),
        Some((field, dir)) if dir.eq_ignore_ascii_case("asc") => Ok((field.to_string(), Direction::Asc)),
        Some(_) => Err(CliError::Argument(format!("unknown direction in {item:?}"))),
        None => Ok((item.to_string(), Direction::Asc)),
    }
}

/// Builds the query described by the command-line arguments.
pub fn build_query(
    table: &str,
    conditions: &[String],
    order_by: &[String],
    group_by: &[String],
) -> Result<SelectQuery, CliError> {
    let mut query = SelectQuery::new(table);
    let mut predicate: Option<Predicate> = None;
    for condition in conditions {
        let next = parse_condition(condition)?;
        predicate = Some(match predicate {
            Some(existing) => existing.and(next),
            None => next,
        });
    }
    if let Some(predicate) = predicate {
        query = query.filter(predicate);
    }
    for item in order_by {
        let (field, direction) = parse_order(item)?;
        query = query.order_by(field, direction);
    }
    for field in group_by {
        query = query.group_by(field.as_str());
    }
    Ok(query)
}

/// Plans and executes `query`.
pub fn evaluate(workspace: &Workspace, query: &SelectQuery) -> QueryResult {
    let mut result = QueryResult {
        table: query.table.clone(),
        decision: "not-indexable",
        reason: None,
        lookups: Vec::new(),
        keys: None,
        restriction: None,
        order: None,
    };

    match workspace.planner.classify(query) {
        PlanDecision::DirectLookup => result.decision = "direct-lookup",
        PlanDecision::NotIndexable { reason } => result.reason = Some(reason),
        PlanDecision::Indexed(plan) => {
            result.decision = "indexed";
            result.lookups = plan.lookups.iter().map(|l| l.index_key.clone()).collect();
            if let Some(restriction) = workspace.planner.restriction(query) {
                result.restriction = Some(restriction.in_clause());
                result.order = Some(restriction.order_case());
                result.keys = Some(restriction.keys);
            } else {
                result.reason = Some("index miss".to_string());
            }
        }
    }
    result
}

/// Runs the query command.
pub fn run(
    workspace: &Workspace,
    table: &str,
    conditions: &[String],
    order_by: &[String],
    group_by: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = build_query(table, conditions, order_by, group_by)?;
    let result = evaluate(workspace, &query);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &QueryResult) {
    println!("Table:    {}", result.table);
    println!("Decision: {}", result.decision);
    if let Some(reason) = &result.reason {
        println!("Reason:   {reason}");
    }
    for lookup in &result.lookups {
        println!("  lookup {lookup}");
    }
    if let Some(keys) = &result.keys {
        println!("Keys ({}):", keys.len());
        for key in keys {
            println!("  {key}");
        }
    }
    if let (Some(restriction), Some(order)) = (&result.restriction, &result.order) {
        println!("WHERE    {restriction}");
        println!("ORDER BY {order}");
    }
}
