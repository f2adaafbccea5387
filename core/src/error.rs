//! Stable, accumulated error identifiers (`spec.md` §6–7).
//!
//! Unlike most of this crate's internal glue, which returns
//! `anyhow::Result` for single-caller setup code, errors that originate
//! during indexing are never short-circuited: they are pushed onto
//! `Outputs::all_errors` and indexing continues, per the "recoverable
//! per-arc errors do not abort the build" rule.

use crate::path::Path;
use thiserror::Error;

/// One of the thirteen stable error kinds a build can report.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PcpError {
    #[error("cycle detected adding arc to {new_site}: {chain:?}")]
    ArcCycle { new_site: Path, chain: Vec<Path> },

    #[error("arc to {site} denied: permission is private")]
    ArcPermissionDenied { site: Path },

    #[error("node at {site} denied contribution by a private ancestor")]
    PrimPermissionDenied { site: Path },

    #[error("invalid prim path: {path}")]
    InvalidPrimPath { path: Path },

    #[error("invalid reference time offset at {site}")]
    InvalidReferenceOffset { site: Path },

    #[error("invalid asset path {asset_path:?} referenced from {site}")]
    InvalidAssetPath { site: Path, asset_path: String },

    #[error("internal reference with non-empty asset path at {site}")]
    InternalAssetPath { site: Path, asset_path: String },

    #[error("reference to muted asset {asset_path:?} from {site}")]
    MutedAssetPath { site: Path, asset_path: String },

    #[error("opinion authored at relocation source {path}")]
    OpinionAtRelocationSource { path: Path },

    #[error("unresolved prim path for arc from {site}")]
    UnresolvedPrimPath { site: Path },

    #[error("node pool capacity exceeded building index for {root}")]
    IndexCapacityExceeded { root: Path },

    #[error("arc capacity exceeded at {site}")]
    ArcCapacityExceeded { site: Path },

    #[error("arc namespace depth capacity exceeded at {site}")]
    ArcNamespaceDepthCapacityExceeded { site: Path },
}

/// Accumulates errors for one build, mirroring `outputs.all_errors`
/// plus each index's own retained local list (`spec.md` §7).
#[derive(Clone, Debug, Default)]
pub struct ErrorList {
    errors: Vec<PcpError>,
    /// Set once `IndexCapacityExceeded` has fired, since capacity
    /// errors are reported at most once per build (`spec.md` §7).
    capacity_reported: bool,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = PcpError>) {
        for error in errors {
            self.push(error);
        }
    }

    pub fn push(&mut self, error: PcpError) {
        if matches!(error, PcpError::IndexCapacityExceeded { .. }) {
            if self.capacity_reported {
                return;
            }
            self.capacity_reported = true;
        }
        self.errors.push(error);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PcpError> {
        self.errors.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_vec(self) -> Vec<PcpError> {
        self.errors
    }
}
