//! Purpose: JSON decode/encode facade with pluggable backends and `json_class` reconstruction.
//! Exports: `api` (the `Json` handle, options, `Node`, `Registry`, errors, backend selection).
//! Role: Library backing the `json-facade` CLI and embedding applications.
//! Invariants: Backend selection is process-wide and happens at most once.
//! Invariants: Decoded trees are owned by the caller; no state is shared between calls.
pub mod api;
mod core;
