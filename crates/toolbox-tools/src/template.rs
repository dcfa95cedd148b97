//! Statement rendering for template parameters.
//!
//! Template parameter values change the structure of a statement (table and
//! column identifiers) and are rendered into its text with minijinja before
//! execution. They are never bound as data.

use crate::error::ToolResult;
use crate::params::ParamValues;
use minijinja::{Environment, Error, UndefinedBehavior, Value};

pub struct StatementTemplate {
    env: Environment<'static>,
}

impl StatementTemplate {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("array", join_array);
        Self { env }
    }

    /// Reject statements that do not parse as templates.
    pub fn check(&self, statement: &str) -> ToolResult<()> {
        // compiled against a scratch environment since `self.env` only
        // accepts 'static sources
        Environment::new().template_from_str(statement)?;
        Ok(())
    }

    pub fn render(&self, statement: &str, values: &ParamValues) -> ToolResult<String> {
        Ok(self.env.render_str(statement, values.to_map())?)
    }
}

impl Default for StatementTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// `{{ columns | array }}` renders `id, name`.
fn join_array(value: Value) -> Result<String, Error> {
    let items: Vec<String> = value.try_iter()?.map(|v| v.to_string()).collect();
    Ok(items.join(", "))
}
