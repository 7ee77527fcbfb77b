use crate::{diagnostic::Diagnostic, node::NodeId, session::Stage};
use thiserror::Error;

/// Convenience type for a result that may contain an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop construction. Problems in the described device are never errors; they are
/// recorded as diagnostics and construction continues.
#[derive(Debug, Error)]
pub enum Error {
  /// The SVD document could not be parsed into a declaration tree.
  #[error("failed to parse SVD document: {0:#}")]
  Parse(#[from] anyhow::Error),

  /// Options could not be read, or the model could not be written as JSON.
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Regex(#[from] regex::Error),

  /// A node index that does not belong to the store.
  #[error("node {0} does not exist")]
  UnknownNode(NodeId),

  /// An invariant that later passes rely on does not hold. Construction aborts; the diagnostics
  /// recorded before the abort are kept.
  #[error("internal error during {stage}: {detail}")]
  Internal {
    stage: Stage,
    detail: String,
    diagnostics: Vec<Diagnostic>,
  },
}
