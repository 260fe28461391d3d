#![forbid(unsafe_code)]

//! flowedit public facade crate.
//!
//! This crate provides the stable surface area for hosts embedding the
//! editor. It re-exports the flow model and the editor session from the
//! internal crates, offers one-call session setup from an
//! [`EditorConfig`], and a lightweight prelude for day-to-day usage.
//!
//! ```no_run
//! use flowedit::prelude::*;
//!
//! # async fn run() -> flowedit::Result<()> {
//! let mut session = flowedit::open(&EditorConfig::default()).await?;
//! session.on_connect(Connection::new("a", Some("text-output"), "b", Some("text-input")));
//! session.save_draft("first try").await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use flowedit_core::{
    AspectRatio, Connection, DragPhase, Edge, EdgeChange, FlowState, KeyChord, Modifiers, Node,
    NodeChange, NodeData, NodeKind, ShapeError, ShortcutAction, TextToImageData, TextToTextData,
    XYPosition, default_flow,
};

// --- Runtime re-exports ----------------------------------------------------

pub use flowedit_runtime::{
    BootstrapSource, BootstrapState, CommitMode, ConfigError, DraftError, DurableSession,
    EditorConfig, EditorSession, HistoryConfig, HistoryStore, ManualClock, MonotonicClock,
    PersistenceGateway, StorageConfig, StorageError, Subscription, Update,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for flowedit hosts.
#[derive(Debug)]
pub enum Error {
    /// The configuration could not be loaded or failed validation.
    Config(ConfigError),
    /// A draft operation failed.
    Draft(DraftError),
    /// Storage failed outside a draft operation.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Draft(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Draft(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<DraftError> for Error {
    fn from(err: DraftError) -> Self {
        Self::Draft(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Standard result type for flowedit APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Session setup --------------------------------------------------------

/// Validate `config`, resolve saved state, and open a durable session
/// showing it.
pub async fn open(config: &EditorConfig) -> Result<DurableSession<MonotonicClock>> {
    let config = config.clone().validated()?;
    let session = DurableSession::open_with_bootstrap(
        PersistenceGateway::new(flowedit_runtime::RedbStore::new(
            &config.storage.database_path,
        )),
        flowedit_runtime::FileTextStore::new(&config.storage.fallback_dir),
        MonotonicClock::new(),
        config.history,
    )
    .await;
    tracing::info!(
        database = %config.storage.database_path.display(),
        "flowedit session opened"
    );
    Ok(session)
}

/// Load a TOML config file and [`open`] a session from it.
#[cfg(feature = "config-file")]
pub async fn open_from_file(
    path: impl AsRef<std::path::Path>,
) -> Result<DurableSession<MonotonicClock>> {
    let config = EditorConfig::from_toml_file(path)?;
    open(&config).await
}

/// Install a global JSON subscriber filtered by `RUST_LOG` (default
/// `info`).
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "tracing-json")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .is_ok()
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        CommitMode, Connection, DurableSession, EdgeChange, EditorConfig, EditorSession, Error,
        FlowState, KeyChord, Modifiers, NodeChange, Result, Update, XYPosition,
    };

    pub use crate::{core, runtime};
}

pub use flowedit_core as core;
pub use flowedit_runtime as runtime;
