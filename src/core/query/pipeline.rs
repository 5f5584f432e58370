// src/core/query/pipeline.rs

//! Parsing of the pipeline query language. A query is a `|`-separated
//! sequence of stages; each stage is parsed independently into a
//! `PipelineStage`. Values may be double-quoted to carry spaces.

use crate::core::errors::LogLensError;

const DEFAULT_HEAD_TAIL: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchTerm {
    /// Bare full-text term(s).
    Text(String),
    /// `field=value` lookup.
    Field { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    Level,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Search(SearchTerm),
    Where { field: String, value: String },
    Stats { group_by: Option<String> },
    Eval { expression: String },
    Sort { field: SortField, descending: bool },
    Head(usize),
    Tail(usize),
}

/// Splits and parses the full pipeline. The first stage must be `search`.
pub fn parse_pipeline(query: &str) -> Result<Vec<PipelineStage>, LogLensError> {
    let stages: Vec<&str> = query.split('|').map(str::trim).collect();
    if stages.is_empty() || stages[0].is_empty() {
        return Err(LogLensError::QueryParse("empty query".into()));
    }

    let mut parsed = Vec::with_capacity(stages.len());
    for (i, stage) in stages.iter().enumerate() {
        let parsed_stage = parse_stage(stage)?;
        if i == 0 && !matches!(parsed_stage, PipelineStage::Search(_)) {
            return Err(LogLensError::QueryParse(
                "pipeline must start with a search stage".into(),
            ));
        }
        parsed.push(parsed_stage);
    }
    Ok(parsed)
}

fn parse_stage(stage: &str) -> Result<PipelineStage, LogLensError> {
    let (command, rest) = match stage.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (stage, ""),
    };

    match command.to_ascii_lowercase().as_str() {
        "search" => {
            if rest.is_empty() {
                return Err(LogLensError::QueryParse("search requires a term".into()));
            }
            Ok(PipelineStage::Search(parse_search_term(rest)))
        }
        "where" => {
            let (field, value) = parse_assignment(rest).ok_or_else(|| {
                LogLensError::QueryParse("where requires field=value".into())
            })?;
            Ok(PipelineStage::Where { field, value })
        }
        "stats" => parse_stats(rest),
        "eval" => Ok(PipelineStage::Eval {
            expression: rest.to_string(),
        }),
        "sort" => parse_sort(rest),
        "head" => Ok(PipelineStage::Head(parse_count(rest)?)),
        "tail" => Ok(PipelineStage::Tail(parse_count(rest)?)),
        other => Err(LogLensError::QueryParse(format!(
            "unknown pipeline stage '{other}'"
        ))),
    }
}

fn parse_search_term(rest: &str) -> SearchTerm {
    match parse_assignment(rest) {
        Some((name, value)) => SearchTerm::Field { name, value },
        None => SearchTerm::Text(unquote(rest).to_string()),
    }
}

/// Parses `field=value`, allowing quoted values. Returns `None` when `rest`
/// is not an assignment (e.g. a bare term, or text containing spaces before
/// the `=`).
fn parse_assignment(rest: &str) -> Option<(String, String)> {
    let (field, value) = rest.split_once('=')?;
    let field = field.trim();
    if field.is_empty() || field.contains(char::is_whitespace) {
        return None;
    }
    Some((field.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_stats(rest: &str) -> Result<PipelineStage, LogLensError> {
    let mut tokens = rest.split_whitespace();
    match tokens.next() {
        Some(t) if t.eq_ignore_ascii_case("count") => {}
        _ => {
            return Err(LogLensError::QueryParse(
                "stats supports only 'count [by <field>]'".into(),
            ));
        }
    }
    match tokens.next() {
        None => Ok(PipelineStage::Stats { group_by: None }),
        Some(t) if t.eq_ignore_ascii_case("by") => {
            let field = tokens
                .next()
                .ok_or_else(|| LogLensError::QueryParse("stats count by requires a field".into()))?;
            Ok(PipelineStage::Stats {
                group_by: Some(field.to_string()),
            })
        }
        Some(other) => Err(LogLensError::QueryParse(format!(
            "unexpected stats argument '{other}'"
        ))),
    }
}

fn parse_sort(rest: &str) -> Result<PipelineStage, LogLensError> {
    if rest.is_empty() {
        return Err(LogLensError::QueryParse("sort requires a field".into()));
    }
    let (descending, name) = match rest.strip_prefix('-') {
        Some(name) => (true, name.trim()),
        None => (false, rest),
    };
    let field = match name.to_ascii_lowercase().as_str() {
        "timestamp" => SortField::Timestamp,
        "level" => SortField::Level,
        other => {
            return Err(LogLensError::QueryParse(format!(
                "unsupported sort field '{other}'"
            )));
        }
    };
    Ok(PipelineStage::Sort { field, descending })
}

fn parse_count(rest: &str) -> Result<usize, LogLensError> {
    if rest.is_empty() {
        return Ok(DEFAULT_HEAD_TAIL);
    }
    let n: usize = rest
        .parse()
        .map_err(|_| LogLensError::QueryParse(format!("invalid count '{rest}'")))?;
    if n == 0 {
        return Err(LogLensError::QueryParse("count must be positive".into()));
    }
    Ok(n)
}
