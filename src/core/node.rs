//! Purpose: Define the decoded JSON tree and the domain-object seam.
//! Exports: `Node`, `Object`, `JsonClass`, `JSON_CLASS_KEY`.
//! Role: Value type returned by decode and accepted by encode.
//! Invariants: `Node` mirrors `serde_json::Value` plus one `Class` variant for rebuilt objects.
//! Invariants: Object key order is insertion order.

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

use crate::core::nesting::with_stack;

/// Reserved mapping key naming the class a decoded object belongs to.
pub const JSON_CLASS_KEY: &str = "json_class";

/// `newtype_struct` name marking a domain-object expansion during serialization.
/// Plain serializers treat it as transparent; the encode guard counts it.
pub(crate) const CLASS_EXPANSION: &str = "$json_facade::private::ClassExpansion";

/// Ordered mapping of a decoded JSON object.
pub type Object = IndexMap<String, Node>;

#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A domain type that can appear in a decoded tree.
///
/// `to_node` is what gets written back out on encode; include the
/// `json_class` tag there if the encoded form should round-trip.
pub trait JsonClass: AsAny + fmt::Debug + Send + Sync + 'static {
    fn json_class(&self) -> &str;

    fn to_node(&self) -> Node;
}

impl dyn JsonClass {
    pub fn downcast_ref<T: JsonClass>(&self) -> Option<&T> {
        <dyn JsonClass as AsAny>::as_any(self).downcast_ref::<T>()
    }
}

#[derive(Clone, Debug, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Node>),
    Object(Object),
    Class(Arc<dyn JsonClass>),
}

impl Node {
    /// Build an object whose first key is the `json_class` tag.
    pub fn tagged(class: &str, fields: Object) -> Node {
        let mut object = Object::with_capacity(fields.len() + 1);
        object.insert(JSON_CLASS_KEY.to_string(), Node::String(class.to_string()));
        object.extend(fields.into_iter().filter(|(key, _)| key != JSON_CLASS_KEY));
        Node::Object(object)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Number(num) => num.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Node::Number(num) => num.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(num) => num.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&dyn JsonClass> {
        match self {
            Node::Class(class) => Some(&**class),
            _ => None,
        }
    }

    /// Borrow the reconstructed domain object as `T`.
    pub fn downcast_ref<T: JsonClass>(&self) -> Option<&T> {
        self.as_class().and_then(|class| class.downcast_ref::<T>())
    }

    /// Look up `key` when this node is an object.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// The `json_class` tag of an object, or the class name of a domain object.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Node::Object(map) => map.get(JSON_CLASS_KEY).and_then(Node::as_str),
            Node::Class(class) => Some(class.json_class()),
            _ => None,
        }
    }

    /// Container depth; scalars are depth 0.
    pub fn depth(&self) -> usize {
        with_stack(|| match self {
            Node::Array(items) => 1 + items.iter().map(Node::depth).max().unwrap_or(0),
            Node::Object(map) => 1 + map.values().map(Node::depth).max().unwrap_or(0),
            Node::Class(class) => class.to_node().depth(),
            _ => 0,
        })
    }

    /// Number of mappings carrying a `json_class` tag, nested ones included.
    pub fn count_tagged(&self) -> usize {
        with_stack(|| match self {
            Node::Array(items) => items.iter().map(Node::count_tagged).sum(),
            Node::Object(map) => {
                let own = usize::from(map.contains_key(JSON_CLASS_KEY));
                own + map.values().map(Node::count_tagged).sum::<usize>()
            }
            Node::Class(_) => 1,
            _ => 0,
        })
    }

    /// Plain `serde_json::Value` form; domain objects are expanded via `to_node`.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Bool(value) => Value::Bool(*value),
            Node::Number(num) => Value::Number(num.clone()),
            Node::String(text) => Value::String(text.clone()),
            Node::Array(items) => Value::Array(items.iter().map(Node::to_value).collect()),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect(),
            ),
            Node::Class(class) => class.to_node().to_value(),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Number(a), Node::Number(b)) => a == b,
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Array(a), Node::Array(b)) => a == b,
            (Node::Object(a), Node::Object(b)) => a == b,
            (Node::Class(a), Node::Class(b)) => {
                a.json_class() == b.json_class() && a.to_node() == b.to_node()
            }
            _ => false,
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(value) => serializer.serialize_bool(*value),
            Node::Number(num) => num.serialize(serializer),
            Node::String(text) => serializer.serialize_str(text),
            Node::Array(items) => items.serialize(serializer),
            Node::Object(map) => map.serialize(serializer),
            Node::Class(class) => {
                serializer.serialize_newtype_struct(CLASS_EXPANSION, &class.to_node())
            }
        }
    }
}

// Deep trees are torn down iteratively rather than one stack frame per level.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = match self {
            Node::Array(items) if !items.is_empty() => mem::take(items),
            Node::Object(map) if !map.is_empty() => map.drain(..).map(|(_, value)| value).collect(),
            _ => return,
        };
        while let Some(mut node) = pending.pop() {
            match &mut node {
                Node::Array(items) => pending.append(items),
                Node::Object(map) => pending.extend(map.drain(..).map(|(_, value)| value)),
                _ => {}
            }
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(value) => Node::Bool(value),
            Value::Number(num) => Node::Number(num),
            Value::String(text) => Node::String(text),
            Value::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Node::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Number(value.into())
    }
}

impl From<u64> for Node {
    fn from(value: u64) -> Self {
        Node::Number(value.into())
    }
}

impl From<f64> for Node {
    /// Non-finite floats become `Null`, as in `serde_json`.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Node::Null, Node::Number)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Array(items)
    }
}

impl From<Object> for Node {
    fn from(map: Object) -> Self {
        Node::Object(map)
    }
}

impl<T: JsonClass> From<Arc<T>> for Node {
    fn from(class: Arc<T>) -> Self {
        Node::Class(class)
    }
}
