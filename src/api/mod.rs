//! Purpose: Define the stable public Rust API boundary for json-facade.
//! Exports: The `Json` facade, option types, tree/registry types, and backend selection.
//! Role: Public, additive-only surface; hides the internal core modules.
//! Invariants: This module is the only public path to core types.
//! Invariants: Internal modules remain private and are not directly exposed.

mod json;

pub use crate::core::backend::{
    self, BACKEND_ENV, Backend, BackendKind, ParseFailureCategory, categorize_message,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::nesting::{DEFAULT_MAX_NESTING, NESTING_HARD_LIMIT};
pub use crate::core::node::{JSON_CLASS_KEY, JsonClass, Node, Object};
pub use crate::core::registry::{ClassEntry, Factory, JsonCreate, PATH_SEPARATOR, Registry};
pub use json::{DecodeOptions, EncodeOptions, Json};
