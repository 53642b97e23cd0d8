//! Payload shapes understood by the front-end renderer, and the functions
//! that reshape result rows into them.
//!
//! Field names are part of the wire contract. Every shaper reads exactly the
//! declared columns; a column missing from a row is emitted as `null`.

use db::Row;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// A result column and its display label, serialized as `[key, label]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

impl Column {
    pub const fn new(key: &'static str, label: &'static str) -> Self {
        Self { key, label }
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.key, self.label).serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Pie,
    Line,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupSpec {
    pub title: &'static str,
    pub chart_type: ChartType,
    pub unit: &'static str,
    pub key: Column,
    pub value: Column,
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesSpec {
    pub title: &'static str,
    pub chart_type: ChartType,
    pub unit: &'static str,
    pub x: Column,
    pub series: Column,
    pub value: Column,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub columns: &'static [Column],
}

#[derive(Debug, Clone, Copy)]
pub struct AreaMapSpec {
    pub map_id: &'static str,
    pub info_id: &'static str,
    pub name_key: &'static str,
    pub value_key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupChart {
    pub info: GroupInfo,
    pub data: GroupData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub chart_type: ChartType,
    pub title: String,
    pub unit: String,
    pub key_name: String,
    pub val_name: String,
    pub on_click: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupData {
    pub cols: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesChart {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub chart_type: ChartType,
    pub title: String,
    pub unit: String,
    pub x_col_title: String,
    pub y_col_title: String,
    pub series_col: String,
    pub x_col: String,
    pub val_cols: Vec<String>,
    pub pivot: Pivot,
    pub cols: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub on_click: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pivot {
    pub key_name: String,
    pub val_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChart {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Vec<Value>>,
    pub on_click: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub id: String,
    pub label: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMap {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub map_id: String,
    pub info_id: String,
    pub on_click: Vec<Value>,
    pub items: Vec<AreaItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaItem {
    pub name: Value,
    pub value: Value,
}

/// Any tool response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Group(GroupChart),
    Series(SeriesChart),
    Table(TableChart),
    AreaMap(AreaMap),
}

impl From<GroupChart> for Payload {
    fn from(chart: GroupChart) -> Self {
        Self::Group(chart)
    }
}

impl From<SeriesChart> for Payload {
    fn from(chart: SeriesChart) -> Self {
        Self::Series(chart)
    }
}

impl From<TableChart> for Payload {
    fn from(chart: TableChart) -> Self {
        Self::Table(chart)
    }
}

impl From<AreaMap> for Payload {
    fn from(chart: AreaMap) -> Self {
        Self::AreaMap(chart)
    }
}

fn cell(row: &Row, key: &str) -> Value {
    row.get(key).cloned().unwrap_or(Value::Null)
}

fn project(rows: &[Row], keys: &[&str]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| keys.iter().map(|key| cell(row, key)).collect())
        .collect()
}

pub fn group_chart(spec: &GroupSpec, rows: &[Row]) -> GroupChart {
    GroupChart {
        info: GroupInfo {
            kind: "group",
            chart_type: spec.chart_type,
            title: spec.title.to_string(),
            unit: spec.unit.to_string(),
            key_name: spec.key.key.to_string(),
            val_name: spec.value.key.to_string(),
            on_click: Vec::new(),
        },
        data: GroupData {
            cols: vec![spec.key, spec.value],
            rows: project(rows, &[spec.key.key, spec.value.key]),
        },
    }
}

pub fn series_chart(spec: &SeriesSpec, rows: &[Row]) -> SeriesChart {
    SeriesChart {
        kind: "Series",
        chart_type: spec.chart_type,
        title: spec.title.to_string(),
        unit: spec.unit.to_string(),
        x_col_title: spec.x.label.to_string(),
        y_col_title: spec.value.label.to_string(),
        series_col: spec.series.key.to_string(),
        x_col: spec.x.key.to_string(),
        val_cols: vec![spec.value.key.to_string()],
        pivot: Pivot {
            key_name: spec.series.key.to_string(),
            val_name: spec.value.key.to_string(),
        },
        cols: vec![spec.x, spec.series, spec.value],
        rows: project(rows, &[spec.x.key, spec.series.key, spec.value.key]),
        on_click: Vec::new(),
    }
}

pub fn table(spec: &TableSpec, rows: &[Row]) -> TableChart {
    let keys: Vec<&str> = spec.columns.iter().map(|column| column.key).collect();
    TableChart {
        kind: "Table",
        columns: spec
            .columns
            .iter()
            .map(|column| TableColumn {
                id: column.key.to_string(),
                label: column.label.to_string(),
                visible: true,
            })
            .collect(),
        rows: project(rows, &keys),
        on_click: Vec::new(),
    }
}

pub fn area_map(spec: &AreaMapSpec, rows: &[Row]) -> AreaMap {
    AreaMap {
        kind: "AreaMap",
        map_id: spec.map_id.to_string(),
        info_id: spec.info_id.to_string(),
        on_click: Vec::new(),
        items: rows
            .iter()
            .map(|row| AreaItem {
                name: cell(row, spec.name_key),
                value: cell(row, spec.value_key),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    const CATEGORY: GroupSpec = GroupSpec {
        title: "Sales by product category",
        chart_type: ChartType::Bar,
        unit: "",
        key: Column::new("category", "Category"),
        value: Column::new("total_sales", "total_sales"),
    };

    #[test]
    fn test_group_chart_rows_follow_column_mapping() {
        let rows = vec![row(json!({"category": "Electronics", "total_sales": 100}))];

        let chart = group_chart(&CATEGORY, &rows);

        assert_eq!(chart.data.rows, vec![vec![json!("Electronics"), json!(100)]]);
        assert_eq!(chart.info.key_name, "category");
        assert_eq!(chart.info.val_name, "total_sales");
    }

    #[test]
    fn test_group_chart_wire_format() {
        let rows = vec![row(json!({"category": "Electronics", "total_sales": 100}))];

        let payload = serde_json::to_value(group_chart(&CATEGORY, &rows)).unwrap();

        assert_eq!(
            payload,
            json!({
                "info": {
                    "type": "group",
                    "chartType": "bar",
                    "title": "Sales by product category",
                    "unit": "",
                    "keyName": "category",
                    "valName": "total_sales",
                    "onClick": [],
                },
                "data": {
                    "cols": [["category", "Category"], ["total_sales", "total_sales"]],
                    "rows": [["Electronics", 100]],
                },
            })
        );
    }

    #[test]
    fn test_series_chart_wire_format() {
        let spec = SeriesSpec {
            title: "Monthly sales trend by category",
            chart_type: ChartType::Line,
            unit: "#",
            x: Column::new("calendar_month_desc", "Month"),
            series: Column::new("category", "Category"),
            value: Column::new("total_sales", "total_sales"),
        };
        let rows = vec![
            row(json!({"calendar_month_desc": "2024-01", "category": "Golf", "total_sales": 10})),
            row(json!({"calendar_month_desc": "2024-01", "category": "Tennis", "total_sales": 7.5})),
        ];

        let payload = serde_json::to_value(series_chart(&spec, &rows)).unwrap();

        assert_eq!(
            payload,
            json!({
                "type": "Series",
                "chartType": "line",
                "title": "Monthly sales trend by category",
                "unit": "#",
                "xColTitle": "Month",
                "yColTitle": "total_sales",
                "seriesCol": "category",
                "xCol": "calendar_month_desc",
                "valCols": ["total_sales"],
                "pivot": {"keyName": "category", "valName": "total_sales"},
                "cols": [
                    ["calendar_month_desc", "Month"],
                    ["category", "Category"],
                    ["total_sales", "total_sales"],
                ],
                "rows": [["2024-01", "Golf", 10], ["2024-01", "Tennis", 7.5]],
                "onClick": [],
            })
        );
    }

    #[test]
    fn test_table_missing_key_becomes_null() {
        const COLUMNS: &[Column] = &[
            Column::new("category", "Category"),
            Column::new("country", "Country"),
            Column::new("total_sales", "Total Sales"),
        ];
        let rows = vec![
            row(json!({"category": "Golf", "country": "Italy", "total_sales": 5})),
            row(json!({"category": "Golf", "total_sales": 3})),
        ];

        let chart = table(&TableSpec { columns: COLUMNS }, &rows);

        assert_eq!(
            chart.rows,
            vec![
                vec![json!("Golf"), json!("Italy"), json!(5)],
                vec![json!("Golf"), Value::Null, json!(3)],
            ]
        );
        assert_eq!(
            serde_json::to_value(&chart).unwrap()["columns"][1],
            json!({"id": "country", "label": "Country", "visible": true})
        );
    }

    #[test]
    fn test_area_map_wire_format() {
        let spec = AreaMapSpec {
            map_id: "world",
            info_id: "world",
            name_key: "region",
            value_key: "total_sales",
        };
        let rows = vec![row(json!({"region": "Japan", "total_sales": 12.25}))];

        let payload = serde_json::to_value(Payload::from(area_map(&spec, &rows))).unwrap();

        assert_eq!(
            payload,
            json!({
                "type": "AreaMap",
                "mapId": "world",
                "infoId": "world",
                "onClick": [],
                "items": [{"name": "Japan", "value": 12.25}],
            })
        );
    }

    #[test]
    fn test_no_rows_keeps_declared_columns() {
        let chart = group_chart(&CATEGORY, &[]);
        assert!(chart.data.rows.is_empty());
        assert_eq!(chart.data.cols, vec![CATEGORY.key, CATEGORY.value]);
    }
}
