//! Query planning against the index store.
//!
//! The planner turns a conjunctive equality predicate into index bucket
//! lookups, intersects them, and orders/groups the surviving primary keys
//! using the data hashes. Every failure degrades to "not indexable" so the
//! caller falls back to the source table.

use crate::config::Config;
use crate::lookup::{self, Lookup};
use crate::rewrite::KeyRestriction;
use crate::schema::{IndexSchema, SchemaRegistry};
use crate::statement::{Direction, Literal, OrderBy, SelectQuery};
use kvdex_storage::{KeyValueStore, StoreResult};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of classifying a query.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    /// The predicate pins a single row through the primary key or a unique
    /// index; the source answers it directly.
    DirectLookup,
    /// The query cannot use the index.
    NotIndexable {
        /// Why the index was not used.
        reason: String,
    },
    /// The query can be answered from the index.
    Indexed(IndexPlan),
}

impl PlanDecision {
    fn not_indexable(reason: impl Into<String>) -> Self {
        PlanDecision::NotIndexable {
            reason: reason.into(),
        }
    }

    /// The plan, if the query is indexable.
    #[must_use]
    pub fn plan(&self) -> Option<&IndexPlan> {
        match self {
            PlanDecision::Indexed(plan) => Some(plan),
            _ => None,
        }
    }
}

/// Bucket lookups and post-processing steps for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    /// Target table.
    pub table: String,
    /// Buckets to read, in predicate order.
    pub lookups: Vec<Lookup>,
    /// Ordering applied to the candidates.
    pub order_by: Vec<OrderBy>,
    /// Grouping applied after ordering.
    pub group_by: Vec<String>,
}

/// Plans and executes index lookups.
pub struct QueryPlanner {
    store: Arc<dyn KeyValueStore>,
    registry: Arc<SchemaRegistry>,
    config: Config,
}

impl QueryPlanner {
    /// Creates a planner with the default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>, registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(store, registry, Config::default())
    }

    /// Creates a planner with `config`.
    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<SchemaRegistry>,
        config: Config,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Decides whether and how `query` can use the index. Does not touch the store.
    #[must_use]
    pub fn classify(&self, query: &SelectQuery) -> PlanDecision {
        let Some(schema) = self.registry.get(&query.table) else {
            return PlanDecision::not_indexable(format!("no index schema for {}", query.table));
        };
        let Some(predicate) = &query.predicate else {
            return PlanDecision::not_indexable("no WHERE clause");
        };

        if predicate
            .equality_on(&schema.primary_key)
            .and_then(Literal::to_value)
            .is_some()
        {
            return PlanDecision::DirectLookup;
        }
        let equalities = predicate.equalities();
        let covers_unique = schema.indexes.iter().filter(|i| i.unique).any(|index| {
            index.fields.iter().all(|field| {
                equalities
                    .iter()
                    .any(|(column, value)| column == field && value.to_value().is_some())
            })
        });
        if covers_unique {
            return PlanDecision::DirectLookup;
        }

        let extracted = lookup::extract_equalities(predicate, |c| schema.is_plannable_field(c));
        if extracted.is_empty() {
            return PlanDecision::not_indexable("no equality on a non-unique indexed field");
        }

        let lookups = lookup::build_lookups(&schema, &extracted, false, self.config.composite_lookups);
        if lookups.is_empty() {
            return PlanDecision::not_indexable("constrained fields only cover part of a composite index");
        }

        PlanDecision::Indexed(IndexPlan {
            table: schema.table_name.clone(),
            lookups,
            order_by: query.order_by.clone(),
            group_by: query.group_by.clone(),
        })
    }

    /// Ordered primary keys matching `query`, or `None` to fall back to the source.
    ///
    /// An empty match is reported as `None` too: the index cannot prove a
    /// query has no rows.
    #[must_use]
    pub fn primary_keys(&self, query: &SelectQuery) -> Option<Vec<String>> {
        let plan = match self.classify(query) {
            PlanDecision::Indexed(plan) => plan,
            PlanDecision::DirectLookup => {
                tracing::debug!(table = %query.table, "single-row lookup, bypassing index");
                return None;
            }
            PlanDecision::NotIndexable { reason } => {
                tracing::debug!(table = %query.table, %reason, "query not indexable");
                return None;
            }
        };

        match self.execute(&plan) {
            Ok(keys) if keys.is_empty() => {
                tracing::debug!(table = %plan.table, "index miss");
                None
            }
            Ok(keys) => Some(keys),
            Err(e) => {
                tracing::warn!(table = %plan.table, error = %e, "index lookup failed, falling back");
                None
            }
        }
    }

    /// The `IN` restriction and tie-break ordering for `query`, if indexable.
    #[must_use]
    pub fn restriction(&self, query: &SelectQuery) -> Option<KeyRestriction> {
        let schema = self.registry.get(&query.table)?;
        let keys = self.primary_keys(query)?;
        Some(KeyRestriction::new(schema.primary_key.clone(), keys))
    }

    /// Runs `plan` against the store.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub fn execute(&self, plan: &IndexPlan) -> StoreResult<Vec<String>> {
        let mut found: Vec<Vec<String>> = Vec::with_capacity(plan.lookups.len());
        for bucket in &plan.lookups {
            let members = lookup::fetch_bucket(self.store.as_ref(), &bucket.index_key)?;
            if !members.is_empty() {
                found.push(members);
            }
        }

        let mut found = found.into_iter();
        let Some(base) = found.next() else {
            return Ok(Vec::new());
        };
        let others: Vec<Vec<String>> = found.collect();
        let mut keys = lookup::intersect(base, &others);

        if !plan.order_by.is_empty() {
            keys = self.order(&plan.table, keys, &plan.order_by)?;
        }
        if !plan.group_by.is_empty() {
            keys = self.group(&plan.table, keys, &plan.group_by)?;
        }
        Ok(keys)
    }

    fn resolve(&self, table: &str, key: &str, fields: &[&str]) -> StoreResult<Vec<Option<String>>> {
        fields
            .iter()
            .map(|field| self.store.get_field_value(table, key, field))
            .collect()
    }

    fn order(&self, table: &str, keys: Vec<String>, order_by: &[OrderBy]) -> StoreResult<Vec<String>> {
        let fields: Vec<&str> = order_by.iter().map(|o| o.field.as_str()).collect();
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let values = self.resolve(table, &key, &fields)?;
            rows.push((key, values));
        }

        let sorted = stable_sort(rows, &|a: &(String, Vec<Option<String>>), b: &(String, Vec<Option<String>>)| {
            compare_rows(&a.1, &b.1, order_by)
        });
        Ok(sorted.into_iter().map(|(key, _)| key).collect())
    }

    fn group(&self, table: &str, keys: Vec<String>, group_by: &[String]) -> StoreResult<Vec<String>> {
        let fields: Vec<&str> = group_by.iter().map(String::as_str).collect();
        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for key in keys {
            let group_key = self
                .resolve(table, &key, &fields)?
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect::<Vec<_>>()
                .join(":");
            let slot = *slots.entry(group_key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(key);
        }
        Ok(groups.into_iter().flatten().collect())
    }

    /// The schema the planner would use for `table`.
    #[must_use]
    pub fn schema(&self, table: &str) -> Option<Arc<IndexSchema>> {
        self.registry.get(table)
    }
}

/// Compares two field values: numerically if both parse, else as strings.
#[must_use]
pub fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Compares resolved ORDER BY values field by field. A value missing on
/// either side skips that field.
fn compare_rows(a: &[Option<String>], b: &[Option<String>], order_by: &[OrderBy]) -> Ordering {
    for (i, item) in order_by.iter().enumerate() {
        let (Some(Some(x)), Some(Some(y))) = (a.get(i), b.get(i)) else {
            continue;
        };
        let ordering = match item.direction {
            Direction::Asc => compare_values(x, y),
            Direction::Desc => compare_values(y, x),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable merge sort. Unlike `slice::sort_by` it never panics when the
/// comparator is not a total order, which skipped fields make possible.
fn stable_sort<T, F>(mut items: Vec<T>, cmp: &F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    if items.len() < 2 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let left = stable_sort(items, cmp);
    let right = stable_sort(right, cmp);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => cmp(r, l) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDefinition;
    use crate::statement::Predicate;
    use kvdex_storage::{keys, InMemoryStore, LoopbackClient, CommandStore};

    fn schema() -> IndexSchema {
        IndexSchema::new("orders", "id")
            .with_index(IndexDefinition::new("status_idx", ["status"]).with_sort_field("amount"))
            .with_index(IndexDefinition::new("region_idx", ["region"]))
            .with_index(IndexDefinition::new("region_status_idx", ["region", "status"]))
            .with_index(IndexDefinition::new("ref_idx", ["ref"]).unique())
    }

    fn planner_with(store: Arc<dyn KeyValueStore>) -> QueryPlanner {
        let registry = Arc::new(SchemaRegistry::with_schemas(vec![schema()]).unwrap());
        QueryPlanner::new(store, registry)
    }

    fn seed(store: &InMemoryStore, pk: &str, fields: &[(&str, &str)]) {
        for (field, value) in fields {
            store.add_data_field("orders", pk, field, value).unwrap();
            if *field == "status" || *field == "region" {
                let key = keys::index_key("orders", field, value);
                store.add_index_record(&key, pk, 0.0).unwrap();
                store.add_primary_key_to_index_mapping("orders", pk, &key).unwrap();
            }
        }
    }

    #[test]
    fn primary_key_bypass() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("status", "OPEN").and(Predicate::eq("id", 5)));
        assert_eq!(planner.classify(&query), PlanDecision::DirectLookup);
    }

    #[test]
    fn null_primary_key_is_not_a_direct_lookup() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("id", Literal::Null).and(Predicate::eq("status", "OPEN")));
        let plan = planner.classify(&query).plan().cloned().unwrap();
        assert_eq!(plan.lookups[0].index_key, "orders:status:OPEN");
    }

    #[test]
    fn composite_only_fields_skip_single_buckets() {
        let schema = IndexSchema::new("events", "id")
            .with_index(IndexDefinition::new("region_status_idx", ["region", "status"]));
        let registry = Arc::new(SchemaRegistry::with_schemas(vec![schema]).unwrap());
        let planner = QueryPlanner::new(Arc::new(InMemoryStore::new()), registry);

        let both = SelectQuery::new("events")
            .filter(Predicate::eq("region", "EU").and(Predicate::eq("status", "OPEN")));
        let plan = planner.classify(&both).plan().cloned().unwrap();
        let keys: Vec<_> = plan.lookups.iter().map(|l| l.index_key.as_str()).collect();
        assert_eq!(keys, vec!["events:region:EU:status:OPEN"]);

        let partial = SelectQuery::new("events").filter(Predicate::eq("region", "EU"));
        assert!(matches!(planner.classify(&partial), PlanDecision::NotIndexable { .. }));
    }

    #[test]
    fn unique_index_bypass() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let query = SelectQuery::new("orders").filter(Predicate::eq("ref", "R-1"));
        assert_eq!(planner.classify(&query), PlanDecision::DirectLookup);
    }

    #[test]
    fn unknown_table_and_missing_where() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let decision = planner.classify(&SelectQuery::new("nope").filter(Predicate::eq("a", 1)));
        assert!(matches!(decision, PlanDecision::NotIndexable { .. }));
        let decision = planner.classify(&SelectQuery::new("orders"));
        assert!(matches!(decision, PlanDecision::NotIndexable { .. }));
    }

    #[test]
    fn unindexed_equalities_are_ignored() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("note", "x").and(Predicate::Other("amount > 3".into())));
        assert!(matches!(planner.classify(&query), PlanDecision::NotIndexable { .. }));

        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("note", "x").and(Predicate::eq("status", "OPEN")));
        let plan = planner.classify(&query).plan().cloned().unwrap();
        assert_eq!(plan.lookups.len(), 1);
        assert_eq!(plan.lookups[0].index_key, "orders:status:OPEN");
    }

    #[test]
    fn composite_lookup_is_planned() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("status", "OPEN").and(Predicate::eq("region", "EU")));
        let plan = planner.classify(&query).plan().cloned().unwrap();
        let keys: Vec<_> = plan.lookups.iter().map(|l| l.index_key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["orders:status:OPEN", "orders:region:EU", "orders:region:EU:status:OPEN"]
        );
    }

    #[test]
    fn empty_buckets_do_not_empty_the_intersection() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "1", &[("status", "OPEN"), ("region", "EU")]);
        seed(&store, "2", &[("status", "OPEN"), ("region", "US")]);
        let planner = planner_with(store);

        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("status", "OPEN").and(Predicate::eq("region", "EU")));
        assert_eq!(planner.primary_keys(&query), Some(vec!["1".to_string()]));
    }

    #[test]
    fn miss_is_none() {
        let planner = planner_with(Arc::new(InMemoryStore::new()));
        let query = SelectQuery::new("orders").filter(Predicate::eq("status", "OPEN"));
        assert_eq!(planner.primary_keys(&query), None);
    }

    #[test]
    fn ordering_is_stable_and_directional() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "a", &[("status", "OPEN"), ("amount", "10")]);
        seed(&store, "b", &[("status", "OPEN"), ("amount", "9")]);
        seed(&store, "c", &[("status", "OPEN"), ("amount", "10")]);
        seed(&store, "d", &[("status", "OPEN")]);
        let planner = planner_with(store);

        let asc = SelectQuery::new("orders")
            .filter(Predicate::eq("status", "OPEN"))
            .order_by("amount", Direction::Asc);
        assert_eq!(planner.primary_keys(&asc).unwrap(), vec!["b", "a", "c", "d"]);

        let desc = SelectQuery::new("orders")
            .filter(Predicate::eq("status", "OPEN"))
            .order_by("amount", Direction::Desc);
        assert_eq!(planner.primary_keys(&desc).unwrap(), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn grouping_by_first_seen() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "1", &[("status", "OPEN"), ("region", "EU")]);
        seed(&store, "2", &[("status", "OPEN"), ("region", "US")]);
        seed(&store, "3", &[("status", "OPEN"), ("region", "EU")]);
        seed(&store, "4", &[("status", "OPEN")]);
        let planner = planner_with(store);

        let query = SelectQuery::new("orders")
            .filter(Predicate::eq("status", "OPEN"))
            .group_by("region");
        assert_eq!(planner.primary_keys(&query).unwrap(), vec!["1", "3", "2", "4"]);
    }

    #[test]
    fn store_outage_falls_back() {
        let client = Arc::new(LoopbackClient::new());
        let store = Arc::new(CommandStore::new(Arc::clone(&client)));
        store.add_index_record("orders:status:OPEN", "1", 0.0).unwrap();
        let planner = planner_with(store);
        let query = SelectQuery::new("orders").filter(Predicate::eq("status", "OPEN"));
        assert_eq!(planner.primary_keys(&query), Some(vec!["1".to_string()]));

        client.set_connected(false);
        assert_eq!(planner.primary_keys(&query), None);
    }

    #[test]
    fn value_comparison() {
        assert_eq!(compare_values("9", "10"), Ordering::Less);
        assert_eq!(compare_values("b", "a"), Ordering::Greater);
        assert_eq!(compare_values("10", "a"), Ordering::Less);
        assert_eq!(compare_values("1.0", "1"), Ordering::Equal);
    }

    #[test]
    fn merge_sort_is_stable() {
        let items = vec![(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd')];
        let sorted = stable_sort(items, &|x: &(i32, char), y: &(i32, char)| x.0.cmp(&y.0));
        assert_eq!(sorted, vec![(0, 'b'), (0, 'd'), (1, 'a'), (1, 'c')]);
    }

    proptest::proptest! {
        #[test]
        fn merge_sort_agrees_with_std(items in proptest::collection::vec((0u8..8, proptest::prelude::any::<u16>()), 0..64)) {
            let mut expected = items.clone();
            expected.sort_by_key(|item| item.0);
            let sorted = stable_sort(items, &|x: &(u8, u16), y: &(u8, u16)| x.0.cmp(&y.0));
            proptest::prop_assert_eq!(sorted, expected);
        }
    }
}
