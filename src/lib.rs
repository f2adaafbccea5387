//! `pcp`: a thin facade over [`pcp_core`], the prim composition engine.
//!
//! Re-exports the engine's public surface so downstream crates depend
//! on one package name rather than reaching into `pcp-core` directly,
//! the way the teacher's root crate wraps its CRDT engine.

pub use pcp_core::builder::{CulledDependency, Inputs, PayloadState};
pub use pcp_core::error::{ErrorList, PcpError};
pub use pcp_core::finalize::{PrimStackEntry, RangeKind};
pub use pcp_core::layer::{
    AssetResolver, FieldName, FieldValue, Layer, LayerStack, LayerStackIdentifier, Reference,
    RelocatesMap,
};
pub use pcp_core::map_expr::{ExpressionVariables, MapExpression, MapFunction, TimeOffset};
pub use pcp_core::node::{LayerStackHandle, NodeIndex, Permission};
pub use pcp_core::path::Path;
pub use pcp_core::registry::LayerStackRegistry;
pub use pcp_core::{build_prim_index, build_prim_index_with_frame, Outputs, PrimIndex};
