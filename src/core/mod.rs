// Core modules: backends, the decoded tree, class registry, and errors.
pub mod backend;
pub mod bounded;
pub mod error;
pub mod nesting;
pub mod node;
pub mod registry;
pub mod rework;
