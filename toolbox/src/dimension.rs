//! Categorical filter dimensions.
//!
//! The set of dimensions is fixed; their values live in the warehouse and
//! are resolved at runtime through each dimension's lookup query.

use std::fmt;

use db::{QueryArg, ToQueryArg};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{State, ToolError};

pub const DEFAULT_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Country,
    ProductCategory,
    Channel,
    CustomerSegment,
}

impl Dimension {
    pub const ALL: [Self; 4] = [
        Self::Country,
        Self::ProductCategory,
        Self::Channel,
        Self::CustomerSegment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::ProductCategory => "product_category",
            Self::Channel => "channel",
            Self::CustomerSegment => "customer_segment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dimension| dimension.name() == name)
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Country => "map",
            Self::ProductCategory => "tag",
            Self::Channel => "share",
            Self::CustomerSegment => "users",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Country => "Represents a country for filtering purposes.",
            Self::ProductCategory => "Represents a product category for filtering purposes.",
            Self::Channel => "Represents a sales channel for filtering purposes.",
            Self::CustomerSegment => "Represents a customer segment for filtering purposes.",
        }
    }

    /// Name of the query that lists candidate values.
    pub fn lookup_query(self) -> &'static str {
        match self {
            Self::Country => "country_enum",
            Self::ProductCategory => "product_category_enum",
            Self::Channel => "channel_enum",
            Self::CustomerSegment => "customer_segment_enum",
        }
    }

    /// Values containing `query`, at most `limit` of them.
    ///
    /// # Errors
    /// Fails only when the lookup query is not defined.
    pub async fn search(
        self,
        state: &State,
        query: &str,
        limit: u32,
    ) -> Result<Vec<DimensionValue>, ToolError> {
        let rows = state
            .search(self.lookup_query(), query, true, limit)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| match row.get("name") {
                Some(Value::String(name)) => DimensionValue::new(name.as_str()).ok(),
                Some(Value::Number(number)) => DimensionValue::new(number.to_string()).ok(),
                _ => None,
            })
            .collect())
    }

    /// The single best candidate for `query`.
    ///
    /// # Errors
    /// Fails only when the lookup query is not defined.
    pub async fn find_best_match(
        self,
        state: &State,
        query: &str,
    ) -> Result<Option<DimensionValue>, ToolError> {
        Ok(self.search(state, query, 1).await?.into_iter().next())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A canonical value of some [`Dimension`], as stored in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DimensionValue(String);

impl DimensionValue {
    /// # Errors
    /// Rejects blank values.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ToolError::InvalidValue(
                "dimension values must not be blank".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DimensionValue {
    type Error = ToolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DimensionValue> for String {
    fn from(value: DimensionValue) -> Self {
        value.0
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToQueryArg for DimensionValue {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Text(self.0.clone())
    }
}
