//! Response validation and reconciliation
//!
//! Maps a scoring response back onto the batch that produced it. The
//! response shape is all-or-nothing; individual records are checked one by
//! one and a bad record only costs itself.
//!
//! Per-record checks run in order and stop at the first failure:
//! 1. all four fields present
//! 2. id is a string of accepted length
//! 3. score is an integer in range
//! 4. category in the closed set
//! 5. audience in the closed set
//!
//! A valid record must also name a story that was actually sent in the
//! batch, and only the first record per story is kept.

use serde_json::{Map, Value};
use shorts_common::models::{ITEM_ID_LEN, SCORE_MAX, SCORE_MIN};
use shorts_common::{Evaluation, Item};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Accepted spellings of the id field
const ID_FIELDS: [&str; 2] = ["reddit_id", "item_id"];

/// Accepted spellings of the audience field
const AUDIENCE_FIELDS: [&str; 2] = ["target_audience", "audience"];

/// The response as a whole could not be read as a list of records
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("response is {0}, expected a list of evaluations")]
    NotAList(&'static str),

    #[error("response object has no 'evaluations' list")]
    MissingEvaluations,
}

/// Why one candidate record was dropped
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordRejection {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("malformed id: {0}")]
    MalformedId(String),

    #[error("invalid score: {0}")]
    InvalidScore(String),

    #[error("invalid category: {0}")]
    InvalidCategory(String),

    #[error("invalid target audience: {0}")]
    InvalidAudience(String),

    #[error("id {0} was not sent in this batch")]
    UnexpectedId(String),

    #[error("id {0} evaluated more than once")]
    DuplicateId(String),
}

/// Outcome of matching one response against its batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Valid evaluations for stories in the batch, in response order
    pub accepted: Vec<Evaluation>,
    /// Every dropped record with its reason
    pub rejected: Vec<RecordRejection>,
    /// Sent ids without an accepted evaluation, in batch order
    pub missing: Vec<String>,
}

impl Reconciliation {
    /// Valid ids the batch never contained
    pub fn unexpected(&self) -> Vec<&str> {
        self.rejected
            .iter()
            .filter_map(|r| match r {
                RecordRejection::UnexpectedId(id) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// The candidate records of a response
///
/// Accepts either a bare list or an object wrapping it under `evaluations`.
pub fn candidate_records(response: &Value) -> Result<&[Value], ShapeError> {
    match response {
        Value::Array(records) => Ok(records),
        Value::Object(map) => match map.get("evaluations") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(ShapeError::MissingEvaluations),
        },
        other => Err(ShapeError::NotAList(kind_of(other))),
    }
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&'static str]) -> Result<&'a Value, RecordRejection> {
    names
        .iter()
        .find_map(|name| map.get(*name))
        .ok_or(RecordRejection::MissingField(names[0]))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Check one record in isolation (no batch membership)
pub fn validate_record(record: &Value) -> Result<Evaluation, RecordRejection> {
    let map = record.as_object().ok_or(RecordRejection::NotAnObject)?;

    let id = field(map, &ID_FIELDS)?;
    let score = field(map, &["score"])?;
    let category = field(map, &["category"])?;
    let audience = field(map, &AUDIENCE_FIELDS)?;

    let item_id = match id {
        Value::String(s) if ITEM_ID_LEN.contains(&s.chars().count()) => s.clone(),
        other => return Err(RecordRejection::MalformedId(display(other))),
    };

    let score = score
        .as_i64()
        .filter(|s| (SCORE_MIN..=SCORE_MAX).contains(s))
        .ok_or_else(|| RecordRejection::InvalidScore(display(score)))?;

    let category = category
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RecordRejection::InvalidCategory(display(category)))?;

    let audience = audience
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RecordRejection::InvalidAudience(display(audience)))?;

    Ok(Evaluation {
        item_id,
        score,
        category,
        audience,
    })
}

/// Validate every record and match the survivors against the batch
pub fn reconcile(response: &Value, batch: &[Item]) -> Result<Reconciliation, ShapeError> {
    let records = candidate_records(response)?;
    let sent: HashSet<&str> = batch.iter().map(|i| i.id.as_str()).collect();

    let mut result = Reconciliation::default();
    let mut seen: HashSet<String> = HashSet::new();

    for record in records {
        let checked = validate_record(record).and_then(|evaluation| {
            if !sent.contains(evaluation.item_id.as_str()) {
                Err(RecordRejection::UnexpectedId(evaluation.item_id))
            } else if !seen.insert(evaluation.item_id.clone()) {
                Err(RecordRejection::DuplicateId(evaluation.item_id))
            } else {
                Ok(evaluation)
            }
        });

        match checked {
            Ok(evaluation) => {
                debug!(item_id = %evaluation.item_id, score = evaluation.score, "Accepted evaluation");
                result.accepted.push(evaluation);
            }
            Err(rejection) => {
                warn!("Skipping invalid evaluation ({}): {}", rejection, record);
                result.rejected.push(rejection);
            }
        }
    }

    result.missing = batch
        .iter()
        .filter(|i| !seen.contains(&i.id))
        .map(|i| i.id.clone())
        .collect();

    if !result.missing.is_empty() {
        warn!(
            "Missing coverage: {} of {} stories got no valid evaluation: {}",
            result.missing.len(),
            batch.len(),
            result.missing.join(", ")
        );
    }

    Ok(result)
}
