use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryArg {
    Text(String),
    Int(i64),
    Date(NaiveDate),
    Null,
}

/// Conversion from caller-facing filter values into bind values.
///
/// Absent filters become `""` rather than NULL: the warehouse queries treat
/// an empty filter string as "match all".
pub trait ToQueryArg {
    fn to_query_arg(&self) -> QueryArg;
}

impl ToQueryArg for QueryArg {
    fn to_query_arg(&self) -> QueryArg {
        self.clone()
    }
}

impl ToQueryArg for str {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Text(self.to_string())
    }
}

impl ToQueryArg for String {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Text(self.clone())
    }
}

impl ToQueryArg for NaiveDate {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Date(*self)
    }
}

impl ToQueryArg for i64 {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Int(*self)
    }
}

impl ToQueryArg for u32 {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Int(i64::from(*self))
    }
}

// Numeric filters travel as text so they share the type of the "" sentinel.
impl ToQueryArg for f64 {
    fn to_query_arg(&self) -> QueryArg {
        QueryArg::Text(self.to_string())
    }
}

impl<T: ToQueryArg + ?Sized> ToQueryArg for &T {
    fn to_query_arg(&self) -> QueryArg {
        (**self).to_query_arg()
    }
}

impl<T: ToQueryArg> ToQueryArg for Option<T> {
    fn to_query_arg(&self) -> QueryArg {
        match self {
            Some(value) => value.to_query_arg(),
            None => QueryArg::Text(String::new()),
        }
    }
}

/// Named bind values, already normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, QueryArg>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl ToQueryArg) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl ToQueryArg) {
        self.0.insert(name.to_string(), value.to_query_arg());
    }

    pub fn get(&self, name: &str) -> Option<&QueryArg> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryArg)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_filter_is_empty_string() {
        let country: Option<String> = None;
        assert_eq!(country.to_query_arg(), QueryArg::Text(String::new()));
    }

    #[test]
    fn test_absent_numeric_filter_is_empty_string() {
        let min_amount: Option<f64> = None;
        assert_eq!(min_amount.to_query_arg(), QueryArg::Text(String::new()));
        assert_eq!(Some(1500.5).to_query_arg(), QueryArg::Text("1500.5".into()));
    }

    #[test]
    fn test_params_normalize_on_insert() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let params = Params::new()
            .with("end_date", date)
            .with("country", None::<String>)
            .with("limit", 10_i64);

        assert_eq!(params.get("end_date"), Some(&QueryArg::Date(date)));
        assert_eq!(params.get("country"), Some(&QueryArg::Text(String::new())));
        assert_eq!(params.get("limit"), Some(&QueryArg::Int(10)));
        assert_eq!(params.get("missing"), None);
    }
}
