//! The analytical tools. Each one runs a single named query and reshapes
//! the rows into one payload kind.

use chrono::NaiveDate;
use db::Params;
use serde::Deserialize;

use crate::charts::{
    AreaMap, AreaMapSpec, ChartType, Column, GroupChart, GroupSpec, SeriesChart, SeriesSpec,
    TableChart, TableSpec, area_map, group_chart, series_chart, table,
};
use crate::{DimensionValue, State, ToolError};

const SALES_BY_CATEGORY: GroupSpec = GroupSpec {
    title: "Sales by product category",
    chart_type: ChartType::Bar,
    unit: "",
    key: Column::new("category", "Category"),
    value: Column::new("total_sales", "total_sales"),
};

const SALES_BY_CHANNEL: GroupSpec = GroupSpec {
    title: "Sales by channel",
    chart_type: ChartType::Bar,
    unit: "",
    key: Column::new("channel", "Channel"),
    value: Column::new("total_sales", "total_sales"),
};

const CUSTOMER_DENSITY: GroupSpec = GroupSpec {
    title: "Customer density by region",
    chart_type: ChartType::Pie,
    unit: "",
    key: Column::new("region", "Country"),
    value: Column::new("customer_count", "Customer Count"),
};

const MONTHLY_SALES_TREND: SeriesSpec = SeriesSpec {
    title: "Monthly sales trend by category",
    chart_type: ChartType::Line,
    unit: "#",
    x: Column::new("calendar_month_desc", "Month"),
    series: Column::new("category", "Category"),
    value: Column::new("total_sales", "total_sales"),
};

const QUARTERLY_SALES_BY_CHANNEL: SeriesSpec = SeriesSpec {
    title: "Quarterly sales by channel",
    chart_type: ChartType::Line,
    unit: "#",
    x: Column::new("calendar_quarter_desc", "Quarter"),
    series: Column::new("category", "Channel"),
    value: Column::new("total_sales", "total_sales"),
};

const SALES_ANALYSIS: TableSpec = TableSpec {
    columns: &[
        Column::new("category", "Category"),
        Column::new("country", "Country"),
        Column::new("total_sales", "Total Sales"),
        Column::new("total_quantity", "Total Quantity"),
        Column::new("unique_customers", "Unique Customers"),
        Column::new("avg_sale_amount", "Avg Sale Amount"),
        Column::new("avg_unit_price", "Avg Unit Price"),
    ],
};

const SALES_BY_COUNTRY: AreaMapSpec = AreaMapSpec {
    map_id: "world",
    info_id: "world",
    name_key: "region",
    value_key: "total_sales",
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalesByCategory {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub country: Option<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalesByChannel {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub product_category: Option<DimensionValue>,
    #[serde(default)]
    pub customer_segment: Option<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomerDensity {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub customer_segment: Option<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlySalesTrend {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub country: Option<DimensionValue>,
    #[serde(default)]
    pub product_category: Option<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuarterlySalesByChannel {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub customer_segment: Option<DimensionValue>,
    #[serde(default)]
    pub min_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalesAnalysis {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub product_category: Option<DimensionValue>,
    #[serde(default)]
    pub country: Option<DimensionValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalesByCountry {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub product_category: Option<DimensionValue>,
    #[serde(default)]
    pub min_sales: Option<f64>,
}

fn date_range(start_date: NaiveDate, end_date: NaiveDate) -> Params {
    Params::new()
        .with("start_date", start_date)
        .with("end_date", end_date)
}

/// Total sales by product category, optionally for one country.
///
/// # Errors
/// Fails only when the query is not defined.
pub async fn sales_by_category(
    state: &State,
    params: &SalesByCategory,
) -> Result<GroupChart, ToolError> {
    let query = date_range(params.start_date, params.end_date).with("country", &params.country);
    let rows = state.run_query("sales_by_category", &query).await?;
    Ok(group_chart(&SALES_BY_CATEGORY, &rows))
}

/// Total sales by channel.
///
/// # Errors
/// Fails only when the query is not defined.
pub async fn sales_by_channel(
    state: &State,
    params: &SalesByChannel,
) -> Result<GroupChart, ToolError> {
    let query = date_range(params.start_date, params.end_date)
        .with("product_category", &params.product_category)
        .with("customer_segment", &params.customer_segment);
    let rows = state.run_query("sales_by_channel", &query).await?;
    Ok(group_chart(&SALES_BY_CHANNEL, &rows))
}

/// Customer count per region, as a pie.
///
/// # Errors
/// Fails only when the query is not defined.
pub async fn customer_density(
    state: &State,
    params: &CustomerDensity,
) -> Result<GroupChart, ToolError> {
    let query = date_range(params.start_date, params.end_date)
        .with("customer_segment", &params.customer_segment);
    let rows = state.run_query("customer_density", &query).await?;
    Ok(group_chart(&CUSTOMER_DENSITY, &rows))
}

/// # Errors
/// Fails only when the query is not defined.
pub async fn monthly_sales_trend(
    state: &State,
    params: &MonthlySalesTrend,
) -> Result<SeriesChart, ToolError> {
    let query = date_range(params.start_date, params.end_date)
        .with("country", &params.country)
        .with("product_category", &params.product_category);
    let rows = state.run_query("monthly_sales_trend", &query).await?;
    Ok(series_chart(&MONTHLY_SALES_TREND, &rows))
}

/// # Errors
/// Fails only when the query is not defined.
pub async fn quarterly_sales_by_channel(
    state: &State,
    params: &QuarterlySalesByChannel,
) -> Result<SeriesChart, ToolError> {
    let query = date_range(params.start_date, params.end_date)
        .with("customer_segment", &params.customer_segment)
        .with("min_amount", params.min_amount);
    let rows = state.run_query("quarterly_sales_by_channel", &query).await?;
    Ok(series_chart(&QUARTERLY_SALES_BY_CHANNEL, &rows))
}

/// Sales metrics by category and country, as a table.
///
/// # Errors
/// Fails only when the query is not defined.
pub async fn sales_analysis(state: &State, params: &SalesAnalysis) -> Result<TableChart, ToolError> {
    let query = date_range(params.start_date, params.end_date)
        .with("product_category", &params.product_category)
        .with("country", &params.country);
    let rows = state.run_query("sales_analysis", &query).await?;
    Ok(table(&SALES_ANALYSIS, &rows))
}

/// # Errors
/// Fails only when the query is not defined.
pub async fn sales_by_country(state: &State, params: &SalesByCountry) -> Result<AreaMap, ToolError> {
    let query = date_range(params.start_date, params.end_date)
        .with("product_category", &params.product_category)
        .with("min_sales", params.min_sales);
    let rows = state.run_query("sales_by_country", &query).await?;
    Ok(area_map(&SALES_BY_COUNTRY, &rows))
}
