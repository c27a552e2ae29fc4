pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS interactions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  question TEXT NOT NULL,
  question_sha256 TEXT NOT NULL,
  sql TEXT NOT NULL,
  result_json TEXT,
  source TEXT NOT NULL DEFAULT 'ask',
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_interactions_question_sha256 ON interactions(question_sha256);
"#;

pub const SCHEMA_VERSION: i64 = 2;
