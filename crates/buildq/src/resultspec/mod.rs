pub mod columns;
pub mod multi_id;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow, bail};
use rusqlite::types::Value as SqlValue;

pub use columns::{
    DISPLAY_ID_FIELD, FieldMapping, builds_field_mapping, properties_field_mapping, resolve_column,
};
pub use multi_id::{MULTI_ID_PARAMS, MultiIdParam, augment_filters};

use crate::db::SelectQuery;

/// Raw request argument set, after the transport layer has decoded it.
/// Recognized arguments are popped as the layers consume them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestArgs(BTreeMap<String, String>);

impl RequestArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn pop(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn pop_i64(&mut self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.0.remove(key) else {
            return Ok(None);
        };
        let value = raw
            .parse::<i64>()
            .map_err(|_| anyhow!("invalid integer `{raw}` in request argument `{key}`"))?;
        Ok(Some(value))
    }

    pub fn pop_u64(&mut self, key: &str) -> Result<Option<u64>> {
        let Some(raw) = self.0.remove(key) else {
            return Ok(None);
        };
        let value = raw
            .parse::<u64>()
            .map_err(|_| anyhow!("invalid unsigned integer `{raw}` in request argument `{key}`"))?;
        Ok(Some(value))
    }

    pub fn pop_bool(&mut self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.0.remove(key) else {
            return Ok(None);
        };
        match raw.as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => bail!("invalid boolean `{raw}` in request argument `{key}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl FilterOp {
    /// SQL comparison operator for the scalar ops; `In` compiles to an
    /// IN-set fragment instead.
    const fn sql_operator(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Ne => Some("<>"),
            Self::Lt => Some("<"),
            Self::Le => Some("<="),
            Self::Gt => Some(">"),
            Self::Ge => Some(">="),
            Self::In => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Text(String),
    Boolean(bool),
}

impl FilterValue {
    fn sql_value(&self) -> SqlValue {
        match self {
            Self::Integer(value) => SqlValue::Integer(*value),
            Self::Text(text) => SqlValue::Text(text.clone()),
            Self::Boolean(flag) => SqlValue::Integer(i64::from(*flag)),
        }
    }
}

/// One predicate over a logical field. Filters conjoin; evaluation order
/// does not matter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<FilterValue>,
}

impl Filter {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            values: vec![value],
        }
    }

    #[must_use]
    pub fn in_set(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In,
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: String,
    pub descending: bool,
}

impl OrderSpec {
    /// A leading `-` requests descending order.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: raw.to_string(),
                descending: false,
            },
        }
    }
}

/// Requested property projection: everything, or a concrete name set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertiesProjection {
    All,
    Names(BTreeSet<String>),
}

impl PropertiesProjection {
    /// `*` anywhere in the request means all properties; an empty request
    /// means no projection at all.
    #[must_use]
    pub fn from_requested(names: &[&str]) -> Option<Self> {
        if names.is_empty() {
            return None;
        }
        if names.contains(&"*") {
            return Some(Self::All);
        }
        Some(Self::Names(
            names.iter().map(ToString::to_string).collect(),
        ))
    }

    /// The restricting name set, or `None` for the wildcard.
    #[must_use]
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::Names(names) => Some(names),
        }
    }
}

/// Declarative filtering, sorting, pagination, and property projection
/// over a logical field namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSpec {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub properties: Option<PropertiesProjection>,
}

impl ResultSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a spec from request arguments: `order` (comma-separated,
    /// leading `-` for descending), `limit`, `offset`, `property`
    /// (comma-separated names, `*` for all), plus the multi-id filter
    /// parameters. Consumed arguments are popped; everything else stays.
    pub fn from_request(args: &mut RequestArgs) -> Result<Self> {
        let mut spec = Self::new();

        if let Some(raw) = args.pop("order") {
            for field in raw.split(',').filter(|field| !field.is_empty()) {
                spec.order.push(OrderSpec::parse(field));
            }
        }
        spec.limit = args.pop_u64("limit")?;
        spec.offset = args.pop_u64("offset")?;
        if let Some(raw) = args.pop("property") {
            let names: Vec<&str> = raw.split(',').filter(|name| !name.is_empty()).collect();
            spec.properties = PropertiesProjection::from_requested(&names);
        }

        spec.filters.extend(augment_filters(args)?);
        Ok(spec)
    }

    /// Removes and returns an equality filter on `field` as a boolean, so
    /// the store can apply it as a direct parameter instead of a generic
    /// predicate.
    pub fn pop_boolean_filter(&mut self, field: &str) -> Option<bool> {
        let filter = self.pop_eq_filter(field)?;
        match filter.values.first() {
            Some(FilterValue::Boolean(flag)) => Some(*flag),
            Some(FilterValue::Integer(value)) => Some(*value != 0),
            _ => None,
        }
    }

    /// Integer counterpart of [`ResultSpec::pop_boolean_filter`].
    pub fn pop_integer_filter(&mut self, field: &str) -> Option<i64> {
        let filter = self.pop_eq_filter(field)?;
        match filter.values.first() {
            Some(FilterValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    fn pop_eq_filter(&mut self, field: &str) -> Option<Filter> {
        let index = self
            .filters
            .iter()
            .position(|filter| filter.field == field && filter.op == FilterOp::Eq)?;
        Some(self.filters.remove(index))
    }

    /// Removes and returns the property projection, if one was requested.
    pub fn pop_properties(&mut self) -> Option<PropertiesProjection> {
        self.properties.take()
    }

    /// Compiles the remaining filters, ordering, and pagination into the
    /// query, resolving every logical field through `mapping`. This is the
    /// shaping pass that runs inside the backing-store call.
    pub fn apply(&self, query: &mut SelectQuery, mapping: &FieldMapping) -> Result<()> {
        for filter in &self.filters {
            let column = resolve_column(mapping, &filter.field)?;
            match filter.op.sql_operator() {
                None => {
                    query.push_in_condition(
                        &column,
                        filter.values.iter().map(FilterValue::sql_value),
                    );
                }
                Some(operator) => {
                    let [value] = filter.values.as_slice() else {
                        bail!(
                            "filter on `{}` requires exactly one value, got {}",
                            filter.field,
                            filter.values.len()
                        );
                    };
                    query.push_condition(
                        format!("{column} {operator} ?"),
                        [value.sql_value()],
                    );
                }
            }
        }

        for order in &self.order {
            let column = resolve_column(mapping, &order.field)?;
            let direction = if order.descending { "DESC" } else { "ASC" };
            query.push_order(format!("{column} {direction}"));
        }

        if let Some(limit) = self.limit {
            query.set_limit(limit);
        }
        if let Some(offset) = self.offset {
            query.set_offset(offset);
        }
        Ok(())
    }
}
