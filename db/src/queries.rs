//! Named query definitions.
//!
//! Definitions live in a plain SQL file, one block per query:
//!
//! ```sql
//! -- name: sales_by_channel
//! -- Total sales per channel.
//! SELECT ch.channel_desc AS channel, SUM(s.amount_sold) AS total_sales
//! FROM sales s JOIN channels ch ON ch.channel_id = s.channel_id
//! WHERE s.time_id BETWEEN :start_date AND :end_date
//! GROUP BY ch.channel_desc
//! ```
//!
//! `:name` placeholders are compiled to positional `$n` binds once, at load.

use std::collections::HashMap;
use std::path::Path;

use crate::{DbError, Params, QueryArg};

const NAME_MARKER: &str = "-- name:";
const OPERATOR_SUFFIXES: &[char] = &['!', '<', '*', '#', '^', '$'];

/// A SQL template with its placeholders resolved to bind positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    name: String,
    doc: String,
    sql: String,
    positional: String,
    placeholders: Vec<String>,
}

impl Statement {
    /// Compiles a free-standing SQL template.
    pub fn parse(name: impl Into<String>, sql: &str) -> Self {
        let (positional, placeholders) = compile_placeholders(sql);
        Self {
            name: name.into(),
            doc: String::new(),
            sql: sql.to_string(),
            positional,
            placeholders,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// The template as written, with `:name` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The template with `$n` placeholders, as sent to the driver.
    pub fn positional_sql(&self) -> &str {
        &self.positional
    }

    /// Distinct placeholder names in bind order.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Orders `params` by placeholder position. Values without a
    /// placeholder are ignored.
    ///
    /// # Errors
    /// Returns [`DbError::MissingParam`] for the first placeholder that has
    /// no value.
    pub fn bind(&self, params: &Params) -> Result<Vec<QueryArg>, DbError> {
        self.placeholders
            .iter()
            .map(|name| {
                params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| DbError::MissingParam(name.clone()))
            })
            .collect()
    }
}

/// All named statements loaded from a definitions file.
#[derive(Debug, Clone, Default)]
pub struct QueryBook {
    statements: HashMap<String, Statement>,
}

impl QueryBook {
    /// # Errors
    /// Fails when the file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DbError::LoadQueries {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// # Errors
    /// Fails on SQL before the first `-- name:` marker, an empty name, an
    /// empty body, or a duplicate name.
    pub fn parse(contents: &str) -> Result<Self, DbError> {
        let mut statements = HashMap::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in contents.lines() {
            if let Some(rest) = line.trim_start().strip_prefix(NAME_MARKER) {
                if let Some((name, body)) = current.take() {
                    insert_statement(&mut statements, name, &body)?;
                }
                current = Some((normalize_name(rest)?, Vec::new()));
                continue;
            }

            match current.as_mut() {
                Some((_, body)) => body.push(line),
                None if line.trim().is_empty() || line.trim_start().starts_with("--") => {}
                None => {
                    return Err(DbError::InvalidQueries(format!(
                        "SQL before the first '{NAME_MARKER}' marker: {}",
                        line.trim()
                    )));
                }
            }
        }

        if let Some((name, body)) = current {
            insert_statement(&mut statements, name, &body)?;
        }

        Ok(Self { statements })
    }

    /// # Errors
    /// Returns [`DbError::UnknownQuery`] when no statement has that name.
    pub fn get(&self, name: &str) -> Result<&Statement, DbError> {
        self.statements
            .get(name)
            .ok_or_else(|| DbError::UnknownQuery(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.statements.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

fn normalize_name(raw: &str) -> Result<String, DbError> {
    let name = raw
        .trim()
        .trim_end_matches(OPERATOR_SUFFIXES)
        .replace('-', "_");
    if name.is_empty() {
        return Err(DbError::InvalidQueries("empty query name".to_string()));
    }
    Ok(name)
}

fn insert_statement(
    statements: &mut HashMap<String, Statement>,
    name: String,
    body: &[&str],
) -> Result<(), DbError> {
    let doc_lines = body
        .iter()
        .take_while(|line| line.trim_start().starts_with("--"))
        .count();
    let doc = body[..doc_lines]
        .iter()
        .map(|line| line.trim_start().trim_start_matches('-').trim())
        .collect::<Vec<_>>()
        .join("\n");
    let sql = body[doc_lines..].join("\n");
    let sql = sql.trim().trim_end_matches(';').trim_end();

    if sql.is_empty() {
        return Err(DbError::InvalidQueries(format!("query '{name}' has no SQL")));
    }
    if statements.contains_key(&name) {
        return Err(DbError::InvalidQueries(format!("duplicate query '{name}'")));
    }

    let mut statement = Statement::parse(name.clone(), sql);
    statement.doc = doc;
    statements.insert(name, statement);
    Ok(())
}

/// Rewrites `:name` placeholders to `$n`, skipping literals, quoted
/// identifiers, comments and `::` casts.
fn compile_placeholders(sql: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let end = quoted_end(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |offset| i + offset);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = chars[i + 2..]
                    .windows(2)
                    .position(|pair| pair == ['*', '/'])
                    .map_or(chars.len(), |offset| i + 2 + offset + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|ch| ch.is_ascii_alphabetic() || *ch == '_') =>
            {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_'))
                    .map_or(chars.len(), |offset| start + offset);
                let name: String = chars[start..end].iter().collect();
                let position = match names.iter().position(|existing| *existing == name) {
                    Some(index) => index + 1,
                    None => {
                        names.push(name);
                        names.len()
                    }
                };
                out.push('$');
                out.push_str(&position.to_string());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    (out, names)
}

/// Index one past the closing quote; a doubled quote is an escaped quote.
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}
