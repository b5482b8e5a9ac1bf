//! Purpose: Public decode/encode entrypoints over the selected backend.
//! Exports: `Json`, `DecodeOptions`, `EncodeOptions`.
//! Role: The one seam callers use; hides backend choice and reconstruction.
//! Invariants: Decode checks the nesting ceiling before the backend sees the text.
//! Invariants: Behavior is identical across backends apart from formatting whitespace.
//! Invariants: Encode never adds `json_class` tags; domain objects encode via `to_node`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::backend::{self, Backend};
use crate::core::bounded;
use crate::core::error::Error;
use crate::core::nesting;
use crate::core::node::Node;
use crate::core::registry::Registry;
use crate::core::rework::rework;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeOptions {
    /// Container depth ceiling; `None` means `DEFAULT_MAX_NESTING`, `Some(0)` lifts it
    /// to `NESTING_HARD_LIMIT`. Larger values are rejected as `Usage`.
    pub max_nesting: Option<usize>,
    /// Promote `json_class`-tagged mappings through the registry.
    pub create_additions: bool,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self {
            max_nesting: None,
            create_additions: true,
        }
    }

    pub fn max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = Some(max_nesting);
        self
    }

    pub fn create_additions(mut self, enabled: bool) -> Self {
        self.create_additions = enabled;
        self
    }

}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EncodeOptions {
    /// Indented output; `None` means compact for `encode`, pretty for `encode_pretty`.
    pub pretty: Option<bool>,
    /// Depth ceiling for the encoded value; same defaults as decode.
    pub max_nesting: Option<usize>,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = Some(pretty);
        self
    }

    pub fn max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = Some(max_nesting);
        self
    }

    /// Merge `{pretty: true}` under these options; an explicit caller choice wins.
    pub fn merged_pretty(&self) -> Self {
        let mut options = self.clone();
        options.pretty.get_or_insert(true);
        options
    }
}

/// Decode/encode handle bound to one backend and one class registry.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Json {
    backend: &'static dyn Backend,
    registry: Arc<Registry>,
}

impl Json {
    /// Handle over the process-wide backend (see `backend::active`).
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        Self::with_backend(backend::active(), registry)
    }

    pub fn with_backend(backend: &'static dyn Backend, registry: impl Into<Arc<Registry>>) -> Self {
        Self {
            backend,
            registry: registry.into(),
        }
    }

    pub fn backend(&self) -> &'static dyn Backend {
        self.backend
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse `source` and rebuild tagged mappings into domain objects.
    pub fn decode(&self, source: &str, options: &DecodeOptions) -> Result<Node, Error> {
        let max_nesting = nesting::effective_ceiling(options.max_nesting)?;
        nesting::check_text(source.as_bytes(), max_nesting)?;
        let raw = self.backend.parse(source)?;
        let registry = options.create_additions.then_some(&*self.registry);
        rework(raw, registry)
    }

    /// Encode `value`, checking depth and float finiteness as it is written.
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        options: &EncodeOptions,
    ) -> Result<String, Error> {
        let max_nesting = nesting::effective_ceiling(options.max_nesting)?;
        let (value, deepest) = bounded::to_value(value, max_nesting)?;
        let pretty = options.pretty.unwrap_or(false);
        let text =
            nesting::with_stack_for_depth(deepest, || self.backend.generate(&value, pretty));
        nesting::dispose(value);
        text
    }

    pub fn encode_pretty<T: Serialize + ?Sized>(
        &self,
        value: &T,
        options: &EncodeOptions,
    ) -> Result<String, Error> {
        self.encode(value, &options.merged_pretty())
    }
}

impl Default for Json {
    /// Handle with an empty registry: tagged mappings fail to resolve.
    fn default() -> Self {
        Self::new(Registry::new())
    }
}

impl fmt::Debug for Json {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Json")
            .field("backend", &self.backend.kind())
            .field("classes", &self.registry.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeOptions, EncodeOptions, Json};
    use crate::core::backend::{BackendKind, get};
    use crate::core::error::ErrorKind;
    use crate::core::nesting::NESTING_HARD_LIMIT;
    use crate::core::node::Node;
    use crate::core::registry::Registry;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn serde_json_handle() -> Json {
        Json::with_backend(get(BackendKind::Serde).expect("serde"), Registry::new())
    }

    #[test]
    fn ceilings_above_the_hard_limit_are_usage_errors() {
        let json = serde_json_handle();
        let too_high = NESTING_HARD_LIMIT + 1;
        let err = json
            .decode("[]", &DecodeOptions::new().max_nesting(too_high))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = json
            .encode(&json!([]), &EncodeOptions::new().max_nesting(too_high))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn zero_ceiling_is_the_hard_limit() {
        let json = serde_json_handle();
        let deep = format!("{}1{}", "[".repeat(200_000), "]".repeat(200_000));
        let err = json
            .decode(&deep, &DecodeOptions::new().max_nesting(0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NestingLimit);
        assert_eq!(err.depth(), Some(NESTING_HARD_LIMIT + 1));
    }

    #[test]
    fn caller_pretty_choice_wins_over_merge() {
        assert_eq!(EncodeOptions::new().merged_pretty().pretty, Some(true));
        assert_eq!(
            EncodeOptions::new().pretty(false).merged_pretty().pretty,
            Some(false)
        );

        let json = serde_json_handle();
        let value = json!({"a": 1});
        let text = json
            .encode_pretty(&value, &EncodeOptions::new().pretty(false))
            .expect("encode");
        assert_eq!(text, r#"{"a":1}"#);
    }

    #[test]
    fn create_additions_off_returns_plain_tree() {
        let json = serde_json_handle();
        let options = DecodeOptions::new().create_additions(false);
        let node = json
            .decode(r#"{"json_class":"Missing::Type","x":1}"#, &options)
            .expect("decode");
        assert_eq!(node.class_name(), Some("Missing::Type"));
        assert!(node.as_object().is_some());
    }

    #[test]
    fn non_string_keys_are_an_encode_error() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        let err = serde_json_handle()
            .encode(&map, &EncodeOptions::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
    }

    #[test]
    fn failing_serialize_impl_is_an_encode_error() {
        struct Refuses;

        impl Serialize for Refuses {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("cannot encode this"))
            }
        }

        let err = serde_json_handle()
            .encode(&Refuses, &EncodeOptions::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert_eq!(err.message(), Some("cannot encode this"));
    }

    #[test]
    fn encode_rejects_values_deeper_than_the_ceiling() {
        let value = json!([[[1]]]);
        let json = serde_json_handle();
        assert!(json.encode(&value, &EncodeOptions::new().max_nesting(3)).is_ok());

        let err = json
            .encode(&value, &EncodeOptions::new().max_nesting(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert_eq!(err.depth(), Some(3));
    }

    #[test]
    fn non_finite_floats_are_an_encode_error() {
        let json = serde_json_handle();
        let err = json
            .encode(&vec![f64::NAN, f64::INFINITY], &EncodeOptions::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert!(json.encode(&vec![1.5, -0.0], &EncodeOptions::new()).is_ok());
    }

    #[test]
    fn scalars_round_trip() {
        let json = serde_json_handle();
        for text in ["null", "true", "12", "-1.5", r#""hi""#] {
            let node = json.decode(text, &DecodeOptions::new()).expect("decode");
            assert_eq!(json.encode(&node, &EncodeOptions::new()).expect("encode"), text);
        }
        assert_eq!(
            json.decode("null", &DecodeOptions::new()).expect("decode"),
            Node::Null
        );
    }
}
