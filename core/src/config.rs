//! Process-wide configuration (`spec.md` §9: "The engine has one
//! process-wide toggle ... read from the environment at startup and
//! treated as immutable thereafter. Otherwise all state is per-build.")

use std::sync::OnceLock;

static NEW_DEFAULT_STANDIN_BEHAVIOR: OnceLock<bool> = OnceLock::new();

/// Whether an unresolved default-prim reference (empty prim path, and
/// the target layer has no `defaultPrim` either) falls back to a
/// pseudo-root placeholder node instead of failing the arc outright.
/// Read once from `PCP_NEW_DEFAULT_STANDIN_BEHAVIOR` on first use.
pub fn new_default_standin_behavior() -> bool {
    *NEW_DEFAULT_STANDIN_BEHAVIOR.get_or_init(|| {
        std::env::var("PCP_NEW_DEFAULT_STANDIN_BEHAVIOR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true)
    })
}
