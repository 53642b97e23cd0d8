use db::memory::MemoryConnector;
use db::{DatabaseResult, DbError, QueryArg, QueryBook};
use serde_json::{Value, json};

use crate::State;

pub(crate) fn queries() -> QueryBook {
    QueryBook::parse(include_str!("../../queries.sql")).unwrap()
}

pub(crate) fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> DatabaseResult {
    DatabaseResult {
        headers: columns
            .iter()
            .map(|name| ((*name).to_string(), "TEXT".to_string()))
            .collect(),
        rows,
    }
}

pub(crate) async fn state_with(
    responder: impl Fn(&str, &[QueryArg]) -> Result<DatabaseResult, DbError> + Send + Sync + 'static,
) -> (State, MemoryConnector) {
    let connector = MemoryConnector::with_responder(responder);
    let state = State::with_connector(Box::new(connector.clone()), "sh", queries())
        .await
        .unwrap();
    (state, connector)
}

/// A state whose lookup queries answer with the first `limit` of
/// `candidates`, in order, as a `name` column.
pub(crate) async fn lookup_state(candidates: &[&str]) -> (State, MemoryConnector) {
    let candidates: Vec<String> = candidates.iter().map(ToString::to_string).collect();
    state_with(move |_, args| {
        let limit = match args.get(1) {
            Some(QueryArg::Int(limit)) => usize::try_from(*limit).unwrap(),
            _ => candidates.len(),
        };
        Ok(result(
            &["NAME"],
            candidates
                .iter()
                .take(limit)
                .map(|name| vec![json!(name)])
                .collect(),
        ))
    })
    .await
}

/// Bind values of every query the connector saw, in order.
pub(crate) fn recorded_args(connector: &MemoryConnector) -> Vec<Vec<QueryArg>> {
    connector
        .statements()
        .into_iter()
        .map(|(_, args)| args)
        .collect()
}
