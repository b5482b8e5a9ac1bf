//! Rebuild a parsed tree, promoting `json_class`-tagged mappings.
//!
//! Children are rebuilt before their parent, so a factory sees nested domain
//! objects already reconstructed. The tag stays in the mapping handed to the
//! factory or constructor. Without a registry the tree is converted as-is.

use serde_json::Value;
use tracing::trace;

use crate::core::error::{Error, ErrorKind};
use crate::core::nesting::with_stack;
use crate::core::node::{JSON_CLASS_KEY, Node, Object};
use crate::core::registry::Registry;

pub(crate) fn rework(value: Value, registry: Option<&Registry>) -> Result<Node, Error> {
    with_stack(|| match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| rework(item, registry))
            .collect::<Result<Vec<_>, _>>()
            .map(Node::Array),
        Value::Object(map) => {
            let mut object = Object::with_capacity(map.len());
            for (key, value) in map {
                object.insert(key, rework(value, registry)?);
            }
            match registry {
                Some(registry) => promote(object, registry),
                None => Ok(Node::Object(object)),
            }
        }
        scalar => Ok(Node::from(scalar)),
    })
}

fn promote(object: Object, registry: &Registry) -> Result<Node, Error> {
    let path = match object.get(JSON_CLASS_KEY) {
        None => return Ok(Node::Object(object)),
        Some(Node::String(path)) => path.clone(),
        Some(_) => {
            return Err(Error::new(ErrorKind::Lookup)
                .with_message(format!("`{JSON_CLASS_KEY}` must name a class as a string")));
        }
    };
    let entry = registry.resolve(&path)?;
    trace!(
        json_class = %path,
        json_create = entry.has_json_create(),
        "reconstructing tagged object"
    );
    entry.construct(object)
}

#[cfg(test)]
mod tests {
    use super::rework;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::node::{JSON_CLASS_KEY, JsonClass, Node, Object};
    use crate::core::registry::Registry;
    use serde_json::json;

    #[derive(Debug)]
    struct Attribute {
        fields: Object,
    }

    impl JsonClass for Attribute {
        fn json_class(&self) -> &str {
            "Chef::Node::Attribute"
        }

        fn to_node(&self) -> Node {
            Node::Object(self.fields.clone())
        }
    }

    impl From<Object> for Attribute {
        fn from(fields: Object) -> Self {
            Self { fields }
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_new::<Attribute>("Chef::Node::Attribute")
            .expect("register");
        registry
    }

    #[test]
    fn untagged_trees_pass_through() {
        let value = json!({"a": [1, "two", null, {"b": false}]});
        let node = rework(value.clone(), Some(&registry())).expect("rework");
        assert_eq!(node, Node::from(value));
    }

    #[test]
    fn nested_tags_are_promoted_inside_out() {
        let mut registry = registry();
        registry
            .register_factory("Chef::Node", |object| {
                let inner = object.get("attrs").expect("attrs");
                assert!(inner.downcast_ref::<Attribute>().is_some());
                Ok(Node::from("built"))
            })
            .expect("register");

        let value = json!({
            "json_class": "Chef::Node",
            "attrs": {"json_class": "Chef::Node::Attribute", "x": 1}
        });
        assert_eq!(rework(value, Some(&registry)).expect("rework"), Node::from("built"));
    }

    #[test]
    fn tag_key_stays_in_the_mapping() {
        let value = json!({"json_class": "Chef::Node::Attribute", "x": 1});
        let node = rework(value, Some(&registry())).expect("rework");
        let attribute = node.downcast_ref::<Attribute>().expect("attribute");
        assert_eq!(
            attribute.fields.get(JSON_CLASS_KEY).and_then(Node::as_str),
            Some("Chef::Node::Attribute")
        );
        assert_eq!(attribute.fields.get("x").and_then(Node::as_i64), Some(1));
    }

    #[test]
    fn tags_inside_arrays_are_promoted() {
        let value = json!([{"json_class": "Chef::Node::Attribute"}, 2]);
        let node = rework(value, Some(&registry())).expect("rework");
        let items = node.as_array().expect("array");
        assert!(items[0].downcast_ref::<Attribute>().is_some());
        assert_eq!(items[1].as_i64(), Some(2));
    }

    #[test]
    fn non_string_tag_is_a_lookup_error() {
        let err = rework(json!({"json_class": 7}), Some(&registry())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
    }

    #[test]
    fn without_a_registry_tags_stay_plain() {
        let value = json!({"json_class": "Missing::Type", "x": [1]});
        let node = rework(value.clone(), None).expect("rework");
        assert_eq!(node, Node::from(value));
    }

    #[test]
    fn deep_trees_rebuild_on_a_default_stack() {
        let mut value = json!(0);
        for _ in 0..20_000 {
            value = json!([value]);
        }
        let node = rework(value, Some(&registry())).expect("rework");
        assert_eq!(node.depth(), 20_000);
    }

    #[test]
    fn factory_errors_propagate_unchanged() {
        let mut registry = Registry::new();
        registry
            .register_factory("Broken", |_| {
                Err(Error::new(ErrorKind::Internal).with_message("factory refused"))
            })
            .expect("register");
        let err = rework(json!({"json_class": "Broken"}), Some(&registry)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.message(), Some("factory refused"));
    }
}
