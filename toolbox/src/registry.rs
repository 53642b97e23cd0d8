//! Tool and dimension registration, the manifest a host reads to discover
//! them, and dispatch of JSON invocations to the typed tools.

use chrono::{Local, Months, NaiveDate};
use serde::Serialize;
use serde::de::{DeserializeOwned, Error as _};
use serde_json::{Map, Value, json};

use crate::charts::Payload;
use crate::dimension::{Dimension, DimensionValue};
use crate::{State, ToolError, tools};

pub const NAMESPACE: &str = "gd-sales-history";
pub const TITLE: &str = "Sales History";
pub const DESCRIPTION: &str = "Sales History Warehouse Explorer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    SalesByCategory,
    SalesByChannel,
    CustomerDensity,
    MonthlySalesTrend,
    QuarterlySalesByChannel,
    SalesAnalysis,
    SalesByCountry,
}

impl ToolId {
    /// The tool id, which is also the name of the query it runs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SalesByCategory => "sales_by_category",
            Self::SalesByChannel => "sales_by_channel",
            Self::CustomerDensity => "customer_density",
            Self::MonthlySalesTrend => "monthly_sales_trend",
            Self::QuarterlySalesByChannel => "quarterly_sales_by_channel",
            Self::SalesAnalysis => "sales_analysis",
            Self::SalesByCountry => "sales_by_country",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Date,
    Number,
    Dimension(Dimension),
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub id: ToolId,
    pub name: &'static str,
    pub description: &'static str,
    pub examples: &'static [&'static str],
    pub manual_update: bool,
    pub params: &'static [ParamSpec],
}

const START_DATE: ParamSpec = ParamSpec {
    name: "start_date",
    kind: ParamKind::Date,
    required: true,
    description: "Start date filter. Defaults to today minus 1 year.",
};

const END_DATE: ParamSpec = ParamSpec {
    name: "end_date",
    kind: ParamKind::Date,
    required: true,
    description: "End date filter. Defaults to today.",
};

const COUNTRY: ParamSpec = ParamSpec {
    name: "country",
    kind: ParamKind::Dimension(Dimension::Country),
    required: false,
    description: "Optional filter for country.",
};

const PRODUCT_CATEGORY: ParamSpec = ParamSpec {
    name: "product_category",
    kind: ParamKind::Dimension(Dimension::ProductCategory),
    required: false,
    description: "Optional filter for product category.",
};

const CUSTOMER_SEGMENT: ParamSpec = ParamSpec {
    name: "customer_segment",
    kind: ParamKind::Dimension(Dimension::CustomerSegment),
    required: false,
    description: "Optional filter for customer segment.",
};

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        id: ToolId::SalesByCategory,
        name: "Sales by product category",
        description: "Analyzes sales performance by product category within a date range, \
                      with an optional country filter. Returns a bar chart of total sales \
                      by product category.",
        examples: &["Sales by product category"],
        manual_update: false,
        params: &[START_DATE, END_DATE, COUNTRY],
    },
    ToolSpec {
        id: ToolId::SalesByChannel,
        name: "Sales by channel",
        description: "Shows total sales amount by sales channel with optional filters. \
                      Returns a bar chart of total sales by channel.",
        examples: &["Sales by channel"],
        manual_update: false,
        params: &[START_DATE, END_DATE, PRODUCT_CATEGORY, CUSTOMER_SEGMENT],
    },
    ToolSpec {
        id: ToolId::CustomerDensity,
        name: "Customer density by region",
        description: "Shows customer count by geographic region for density mapping. \
                      Returns a pie chart of customer density by region.",
        examples: &["Customer density by region"],
        manual_update: false,
        params: &[START_DATE, END_DATE, CUSTOMER_SEGMENT],
    },
    ToolSpec {
        id: ToolId::MonthlySalesTrend,
        name: "Monthly sales trend by category",
        description: "Shows monthly sales trends by product category over time. \
                      Returns a series chart of monthly sales by category.",
        examples: &["Monthly sales trend by category"],
        manual_update: false,
        params: &[START_DATE, END_DATE, COUNTRY, PRODUCT_CATEGORY],
    },
    ToolSpec {
        id: ToolId::QuarterlySalesByChannel,
        name: "Quarterly sales by channel",
        description: "Shows quarterly sales performance by channel over time. \
                      Returns a series chart of quarterly sales by channel.",
        examples: &["Quarterly sales by channel"],
        manual_update: false,
        params: &[
            START_DATE,
            END_DATE,
            CUSTOMER_SEGMENT,
            ParamSpec {
                name: "min_amount",
                kind: ParamKind::Number,
                required: false,
                description: "Optional minimum sales amount filter.",
            },
        ],
    },
    ToolSpec {
        id: ToolId::SalesAnalysis,
        name: "Comprehensive sales analysis",
        description: "Shows detailed sales metrics with multiple dimensions. \
                      Returns a table of sales metrics by category and country.",
        examples: &["Comprehensive sales analysis"],
        manual_update: false,
        params: &[START_DATE, END_DATE, PRODUCT_CATEGORY, COUNTRY],
    },
    ToolSpec {
        id: ToolId::SalesByCountry,
        name: "Sales by country (geographic)",
        description: "Provides sales data by country for geographic visualization. \
                      Returns an area map of total sales by country.",
        examples: &["Sales by country"],
        manual_update: false,
        params: &[
            START_DATE,
            END_DATE,
            PRODUCT_CATEGORY,
            ParamSpec {
                name: "min_sales",
                kind: ParamKind::Number,
                required: false,
                description: "Optional minimum sales amount filter.",
            },
        ],
    },
];

pub fn tool(id: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|spec| spec.id.as_str() == id)
}

impl ToolSpec {
    /// JSON schema of the tool's arguments.
    pub fn parameters(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|param| {
                let schema = match param.kind {
                    ParamKind::Date => json!({
                        "type": "string",
                        "format": "date",
                        "description": param.description,
                    }),
                    ParamKind::Number => json!({
                        "type": "number",
                        "description": param.description,
                    }),
                    ParamKind::Dimension(dimension) => json!({
                        "type": "string",
                        "dimension": dimension.name(),
                        "description": param.description,
                    }),
                };
                (param.name.to_string(), schema)
            })
            .collect();

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumSpec {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

impl From<Dimension> for EnumSpec {
    fn from(dimension: Dimension) -> Self {
        Self {
            name: dimension.name(),
            icon: dimension.icon(),
            description: dimension.description(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolManifest {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub examples: &'static [&'static str],
    pub manual_update: bool,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub ns: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub enums: Vec<EnumSpec>,
    pub tools: Vec<ToolManifest>,
}

/// The registered tools and dimensions bound to a live [`State`].
#[derive(Debug)]
pub struct Toolbox {
    state: State,
}

impl Toolbox {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Everything a host needs to register the tools and dimensions.
    pub fn manifest() -> Manifest {
        Manifest {
            ns: NAMESPACE,
            title: TITLE,
            description: DESCRIPTION,
            enums: Dimension::ALL.into_iter().map(EnumSpec::from).collect(),
            tools: TOOLS
                .iter()
                .map(|spec| ToolManifest {
                    id: spec.id.as_str(),
                    name: spec.name,
                    description: spec.description,
                    examples: spec.examples,
                    manual_update: spec.manual_update,
                    parameters: spec.parameters(),
                })
                .collect(),
        }
    }

    /// Names of registered tool and lookup queries absent from the loaded
    /// query file.
    pub fn missing_queries(&self) -> Vec<&'static str> {
        let queries = self.state.queries();
        TOOLS
            .iter()
            .map(|spec| spec.id.as_str())
            .chain(Dimension::ALL.into_iter().map(Dimension::lookup_query))
            .filter(|name| queries.get(name).is_err())
            .collect()
    }

    /// Candidate values of the dimension called `dimension`.
    ///
    /// # Errors
    /// Fails for an unknown dimension or a missing lookup query.
    pub async fn search(
        &self,
        dimension: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<DimensionValue>, ToolError> {
        let dimension = Dimension::from_name(dimension)
            .ok_or_else(|| ToolError::UnknownDimension(dimension.to_string()))?;
        dimension.search(&self.state, query, limit).await
    }

    /// Runs the tool `tool_id` with JSON arguments and returns its payload.
    ///
    /// # Errors
    /// Fails for an unknown tool, arguments that do not fit its parameters,
    /// or a missing query definition.
    pub async fn invoke(&self, tool_id: &str, args: Value) -> Result<Value, ToolError> {
        self.invoke_on(tool_id, args, Local::now().date_naive())
            .await
    }

    /// [`invoke`](Self::invoke) with the date used for default ranges.
    ///
    /// # Errors
    /// As [`invoke`](Self::invoke).
    pub async fn invoke_on(
        &self,
        tool_id: &str,
        args: Value,
        today: NaiveDate,
    ) -> Result<Value, ToolError> {
        let spec = tool(tool_id).ok_or_else(|| ToolError::UnknownTool(tool_id.to_string()))?;
        let args = self.prepare_args(spec, args, today).await?;
        tracing::info!(tool = tool_id, args = %serde_json::Value::Object(args.clone()), "invoking tool");

        let state = &self.state;
        let payload: Payload = match spec.id {
            ToolId::SalesByCategory => {
                tools::sales_by_category(state, &decode(spec, args)?).await?.into()
            }
            ToolId::SalesByChannel => {
                tools::sales_by_channel(state, &decode(spec, args)?).await?.into()
            }
            ToolId::CustomerDensity => {
                tools::customer_density(state, &decode(spec, args)?).await?.into()
            }
            ToolId::MonthlySalesTrend => {
                tools::monthly_sales_trend(state, &decode(spec, args)?).await?.into()
            }
            ToolId::QuarterlySalesByChannel => {
                tools::quarterly_sales_by_channel(state, &decode(spec, args)?)
                    .await?
                    .into()
            }
            ToolId::SalesAnalysis => {
                tools::sales_analysis(state, &decode(spec, args)?).await?.into()
            }
            ToolId::SalesByCountry => {
                tools::sales_by_country(state, &decode(spec, args)?).await?.into()
            }
        };

        Ok(serde_json::to_value(payload)?)
    }

    /// Drops blank arguments, fills default dates, coerces numeric text and
    /// resolves dimension text to canonical values.
    async fn prepare_args(
        &self,
        spec: &ToolSpec,
        args: Value,
        today: NaiveDate,
    ) -> Result<Map<String, Value>, ToolError> {
        let mut args: Map<String, Value> = if args.is_null() {
            Map::new()
        } else {
            serde_json::from_value(args).map_err(|source| invalid(spec, source))?
        };
        args.retain(|_, value| match value {
            Value::Null => false,
            Value::String(text) => !text.trim().is_empty(),
            _ => true,
        });

        let year_ago = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        args.entry(START_DATE.name)
            .or_insert_with(|| Value::String(year_ago.to_string()));
        args.entry(END_DATE.name)
            .or_insert_with(|| Value::String(today.to_string()));

        for param in spec.params {
            let Some(Value::String(text)) = args.get(param.name) else {
                continue;
            };
            let resolved = match param.kind {
                ParamKind::Date => continue,
                ParamKind::Number => {
                    let number = text
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|number| number.is_finite())
                        .ok_or_else(|| {
                            invalid(
                                spec,
                                serde_json::Error::custom(format!(
                                    "'{text}' is not a finite number for '{}'",
                                    param.name
                                )),
                            )
                        })?;
                    json!(number)
                }
                ParamKind::Dimension(dimension) => {
                    match dimension.find_best_match(&self.state, text).await? {
                        Some(value) => Value::String(value.into()),
                        None => {
                            tracing::warn!(
                                dimension = %dimension,
                                value = %text,
                                "no matching dimension value, using it as given"
                            );
                            continue;
                        }
                    }
                }
            };
            args.insert(param.name.to_string(), resolved);
        }

        Ok(args)
    }

    /// # Errors
    /// Fails when the final commit or close fails.
    pub async fn close(self) -> Result<(), ToolError> {
        self.state.close().await
    }
}

fn invalid(spec: &ToolSpec, source: serde_json::Error) -> ToolError {
    ToolError::InvalidArguments {
        tool: spec.id.as_str().to_string(),
        source,
    }
}

fn decode<T: DeserializeOwned>(spec: &ToolSpec, args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|source| invalid(spec, source))
}
