//! The tools file.
//!
//! A YAML document with four top-level maps:
//!
//! ```yaml
//! sources:
//!   my-db:
//!     kind: sqlite
//!     database: ${DB_PATH}
//! authServices:
//!   my-google-auth:
//!     kind: google
//!     clientId: ${GOOGLE_CLIENT_ID}
//! tools:
//!   get-user:
//!     kind: sqlite-sql
//!     source: my-db
//!     description: Look up a user by id
//!     statement: SELECT * FROM users WHERE id = ?1
//!     parameters:
//!       - name: id
//!         type: integer
//!         description: User id
//! toolsets:
//!   users:
//!     - get-user
//! ```
//!
//! `${VAR}` placeholders are replaced from the environment before parsing.
//! Every source, auth service and tool selects its constructor by `kind`.

use crate::error::{ConfigError, ConfigResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use toolbox_auth::{BoxedAuthServiceConfig, GoogleConfig, JwtConfig, GOOGLE_AUTH_KIND, JWT_AUTH_KIND};
use toolbox_sources::{BoxedSourceConfig, SqliteConfig, SQLITE_SOURCE_KIND};
use toolbox_tools::{
    BoxedToolConfig, SqliteExecuteSqlConfig, SqliteSqlConfig, ToolsetConfig,
    SQLITE_EXECUTE_SQL_KIND, SQLITE_SQL_KIND,
};

/// Static regex for variable substitution, compiled once.
static ENV_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn env_regex() -> &'static regex::Regex {
    ENV_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Parsed tools file, each component already resolved to its kind.
#[derive(Debug, Default)]
pub struct ToolsFile {
    pub sources: BTreeMap<String, BoxedSourceConfig>,
    pub auth_services: BTreeMap<String, BoxedAuthServiceConfig>,
    pub tools: BTreeMap<String, BoxedToolConfig>,
    pub toolsets: BTreeMap<String, ToolsetConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawToolsFile {
    #[serde(default)]
    sources: Option<BTreeMap<String, Value>>,
    #[serde(default, alias = "authSources")]
    auth_services: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    tools: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    toolsets: Option<BTreeMap<String, ToolsetConfig>>,
}

impl ToolsFile {
    /// Read, substitute and parse a tools file from disk.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Io(e),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse tools file text. `origin` only labels errors.
    pub fn parse(content: &str, origin: &str) -> ConfigResult<Self> {
        let content = substitute_env(content)?;
        let raw: Option<RawToolsFile> =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidYaml {
                path: origin.to_string(),
                message: e.to_string(),
            })?;
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        let mut file = Self::default();
        for (name, value) in raw.sources.unwrap_or_default() {
            let config = parse_source(&name, value)?;
            file.sources.insert(name, config);
        }
        for (name, value) in raw.auth_services.unwrap_or_default() {
            let config = parse_auth_service(&name, value)?;
            file.auth_services.insert(name, config);
        }
        for (name, value) in raw.tools.unwrap_or_default() {
            let config = parse_tool(&name, value)?;
            file.tools.insert(name, config);
        }
        file.toolsets = raw.toolsets.unwrap_or_default();
        Ok(file)
    }
}

/// Replace `${VAR}` placeholders from the environment.
fn substitute_env(content: &str) -> ConfigResult<String> {
    let mut missing: Option<String> = None;
    let result = env_regex().replace_all(content, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::EnvVarNotFound { name }),
        None => Ok(result.into_owned()),
    }
}

fn kind_of(component: &'static str, name: &str, value: &Value) -> ConfigResult<String> {
    value
        .get("kind")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ConfigError::MissingKind {
            component,
            name: name.to_string(),
        })
}

fn decode<T: DeserializeOwned>(component: &'static str, name: &str, value: Value) -> ConfigResult<T> {
    serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidComponent {
        component,
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn unknown_kind(component: &'static str, name: &str, kind: String) -> ConfigError {
    ConfigError::UnknownKind {
        component,
        name: name.to_string(),
        kind,
    }
}

fn parse_source(name: &str, value: Value) -> ConfigResult<BoxedSourceConfig> {
    const COMPONENT: &str = "source";
    let kind = kind_of(COMPONENT, name, &value)?;
    match kind.as_str() {
        SQLITE_SOURCE_KIND => Ok(Box::new(decode::<SqliteConfig>(COMPONENT, name, value)?)),
        _ => Err(unknown_kind(COMPONENT, name, kind)),
    }
}

fn parse_auth_service(name: &str, value: Value) -> ConfigResult<BoxedAuthServiceConfig> {
    const COMPONENT: &str = "auth service";
    let kind = kind_of(COMPONENT, name, &value)?;
    match kind.as_str() {
        GOOGLE_AUTH_KIND => Ok(Box::new(decode::<GoogleConfig>(COMPONENT, name, value)?)),
        JWT_AUTH_KIND => Ok(Box::new(decode::<JwtConfig>(COMPONENT, name, value)?)),
        _ => Err(unknown_kind(COMPONENT, name, kind)),
    }
}

fn parse_tool(name: &str, value: Value) -> ConfigResult<BoxedToolConfig> {
    const COMPONENT: &str = "tool";
    let kind = kind_of(COMPONENT, name, &value)?;
    match kind.as_str() {
        SQLITE_SQL_KIND => Ok(Box::new(decode::<SqliteSqlConfig>(COMPONENT, name, value)?)),
        SQLITE_EXECUTE_SQL_KIND => Ok(Box::new(decode::<SqliteExecuteSqlConfig>(
            COMPONENT, name, value,
        )?)),
        _ => Err(unknown_kind(COMPONENT, name, kind)),
    }
}
