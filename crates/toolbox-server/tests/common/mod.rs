//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use toolbox_core::{Registry, ToolsFile};

pub const SECRET: &str = "integration-secret";

pub const TOOLS_FILE: &str = r#"
sources:
  my-db:
    kind: sqlite
    database: ":memory:"
authServices:
  my-jwt:
    kind: jwt
    secret: ${TOOLBOX_TEST_SECRET}
tools:
  exec:
    kind: sqlite-execute-sql
    source: my-db
    description: Run arbitrary SQL
  add:
    kind: sqlite-sql
    source: my-db
    description: Add two numbers
    statement: SELECT ?1 + ?2 AS total
    parameters:
      - name: a
        type: integer
        description: First operand
      - name: b
        type: integer
        description: Second operand
  count-rows:
    kind: sqlite-sql
    source: my-db
    description: Count rows of a table
    statement: SELECT COUNT(*) AS n FROM {{ table }}
    templateParameters:
      - name: table
        type: string
        description: Table to count
  whoami:
    kind: sqlite-sql
    source: my-db
    description: Echo the caller's subject
    statement: SELECT ?1 AS sub
    parameters:
      - name: user
        type: string
        description: Subject from the token
        authServices:
          - name: my-jwt
            field: sub
  protected:
    kind: sqlite-sql
    source: my-db
    description: Requires a token
    statement: SELECT 'ok' AS status
    authRequired: [my-jwt]
toolsets:
  math:
    - add
"#;

/// Write the tools file to disk and load it through the normal path.
pub async fn registry() -> Arc<Registry> {
    std::env::set_var("TOOLBOX_TEST_SECRET", SECRET);
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(TOOLS_FILE.as_bytes()).unwrap();
    let tools = ToolsFile::load(file.path()).unwrap();
    Arc::new(Registry::build(&tools, "9.9.9").await.unwrap())
}

pub fn token(sub: &str) -> String {
    encode(
        &Header::default(),
        &json!({"sub": sub, "exp": get_current_timestamp() + 600}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}
