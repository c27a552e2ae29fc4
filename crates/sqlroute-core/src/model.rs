use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One result row: column name to scalar value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub const NO_RECORDS_MESSAGE: &str = "No records found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Relational,
    Tabular,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Relational => "relational",
            Target::Tabular => "tabular",
        }
    }
}

/// How the router decides between the relational and tabular back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Relational when a known table name occurs verbatim in the question text.
    #[default]
    Question,
    /// Relational when the SQL references a known table as an identifier.
    Sql,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows { rows: Vec<Row> },
    Empty,
}

impl QueryOutcome {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        if rows.is_empty() {
            QueryOutcome::Empty
        } else {
            QueryOutcome::Rows { rows }
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            QueryOutcome::Rows { rows } => rows,
            QueryOutcome::Empty => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, QueryOutcome::Empty)
    }

    /// Caller-facing payload: the row list, or the neutral empty notice.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            QueryOutcome::Rows { rows } => serde_json::Value::Array(
                rows.iter()
                    .cloned()
                    .map(serde_json::Value::Object)
                    .collect(),
            ),
            QueryOutcome::Empty => serde_json::json!({ "message": NO_RECORDS_MESSAGE }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlOrigin {
    Memory,
    Translator,
}

/// The answer to one natural-language question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub sql: String,
    pub target: Target,
    pub origin: SqlOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub outcome: QueryOutcome,
    pub recorded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionSource {
    Ask,
    Train,
}

impl InteractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionSource::Ask => "ask",
            InteractionSource::Train => "train",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "train" => InteractionSource::Train,
            _ => InteractionSource::Ask,
        }
    }
}

/// A persisted question → SQL mapping. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub question: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub source: InteractionSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMatch {
    pub interaction: Interaction,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Inserted { id: i64 },
    Duplicate { existing_id: i64, score: f64 },
}

impl RecordOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, RecordOutcome::Inserted { .. })
    }
}

/// A supervised (question, SQL) pair used to seed the interaction store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    #[serde(alias = "user_query")]
    pub question: String,
    #[serde(alias = "sql_query")]
    pub sql: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Raw completion returned by an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rows_become_empty_outcome() {
        assert_eq!(QueryOutcome::from_rows(vec![]), QueryOutcome::Empty);
        assert_eq!(
            QueryOutcome::Empty.payload()["message"],
            serde_json::json!(NO_RECORDS_MESSAGE)
        );
    }

    #[test]
    fn row_payload_keeps_column_order() {
        let mut row = Row::new();
        row.insert("name".into(), serde_json::json!("Alice"));
        row.insert("id".into(), serde_json::json!(1));
        let out = QueryOutcome::from_rows(vec![row]);
        let text = serde_json::to_string(&out.payload()).unwrap();
        assert_eq!(text, r#"[{"name":"Alice","id":1}]"#);
    }

    #[test]
    fn training_pair_accepts_legacy_field_names() {
        let pair: TrainingPair =
            serde_json::from_str(r#"{"user_query": "List all users.", "sql_query": "SELECT * FROM users;"}"#)
                .unwrap();
        assert_eq!(pair.question, "List all users.");
        assert_eq!(pair.sql, "SELECT * FROM users;");
    }
}
