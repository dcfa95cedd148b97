//! Backend sources for toolbox.
//!
//! A source is a named, live connection to a backend that tools execute
//! statements against. Sources are created once at startup from their
//! configuration, shared read-only by every tool bound to them, and closed
//! at shutdown.
//!
//! Each backend provides two halves:
//! - a [`SourceConfig`], deserialized from the tools file and selected by its
//!   `kind`
//! - a [`Source`], the live handle returned by [`SourceConfig::initialize`]

pub mod error;
pub mod sqlite;

pub use error::{SourceError, SourceResult};
pub use sqlite::{SqliteConfig, SqliteSource, SQLITE_SOURCE_KIND};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A live backend connection.
#[async_trait]
pub trait Source: Send + Sync {
    /// Name of the source, unique within the server.
    fn name(&self) -> &str;

    /// Kind discriminator, e.g. `sqlite`.
    fn kind(&self) -> &str;

    /// Run a statement with positionally bound arguments.
    ///
    /// Returns rows as a JSON array of objects, or `Value::Null` when the
    /// statement produced no rows. Implementations should stop work when
    /// `cancel` fires.
    async fn execute(
        &self,
        statement: &str,
        params: &[Value],
        cancel: &CancellationToken,
    ) -> SourceResult<Value>;

    /// Release the underlying connection. Closing twice is a no-op.
    async fn close(&self) -> SourceResult<()>;
}

/// A shared source handle.
pub type BoxedSource = Arc<dyn Source>;

/// Sources keyed by name.
pub type SourceMap = HashMap<String, BoxedSource>;

/// Configuration for one source kind.
#[async_trait]
pub trait SourceConfig: Send + Sync + Debug {
    /// Kind discriminator this config was parsed for.
    fn kind(&self) -> &str;

    /// Open the source. Receives only its own configuration.
    async fn initialize(&self, name: &str) -> SourceResult<BoxedSource>;
}

/// A boxed source configuration.
pub type BoxedSourceConfig = Box<dyn SourceConfig>;
