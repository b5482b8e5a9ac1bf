//! Purpose: Map `json_class` paths to constructors for object reconstruction.
//! Exports: `Registry`, `ClassEntry`, `JsonCreate`, `Factory`.
//! Role: Closed registration table standing in for reflective type lookup.
//! Invariants: Lookup walks `::`-separated segments left to right from the root.
//! Invariants: A failed lookup names the first segment that does not resolve.
//! Notes: A segment can be a class and a namespace at once (`Chef::Node::Attribute`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind};
use crate::core::node::{JsonClass, Node, Object};

pub const PATH_SEPARATOR: &str = "::";

/// Builds a node from a decoded mapping.
pub type Factory = Box<dyn Fn(Object) -> Result<Node, Error> + Send + Sync>;

/// A class with a dedicated "create from mapping" constructor.
pub trait JsonCreate: JsonClass + Sized {
    fn json_create(object: Object) -> Result<Self, Error>;
}

pub struct ClassEntry {
    path: String,
    json_create: Option<Factory>,
    new: Option<Factory>,
}

impl ClassEntry {
    fn new(path: String) -> Self {
        Self {
            path,
            json_create: None,
            new: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_json_create(&self) -> bool {
        self.json_create.is_some()
    }

    /// Build the replacement for `object`: the `json_create` factory when the
    /// class has one, else the plain constructor.
    pub fn construct(&self, object: Object) -> Result<Node, Error> {
        if let Some(create) = &self.json_create {
            return create(object);
        }
        if let Some(new) = &self.new {
            return new(object);
        }
        Err(Error::new(ErrorKind::Internal)
            .with_message("class entry has no constructor")
            .with_class(self.path.as_str()))
    }
}

impl fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntry")
            .field("path", &self.path)
            .field("json_create", &self.json_create.is_some())
            .field("new", &self.new.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Namespace {
    class: Option<ClassEntry>,
    children: BTreeMap<String, Namespace>,
}

#[derive(Debug, Default)]
pub struct Registry {
    root: Namespace,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `path`, built through `T::json_create`.
    pub fn register_json_create<T: JsonCreate>(&mut self, path: &str) -> Result<&mut Self, Error> {
        self.register_factory(path, |object| {
            T::json_create(object).map(|value| Node::Class(Arc::new(value)))
        })
    }

    /// Register `T` under `path`, built by passing the mapping to `T::from`.
    pub fn register_new<T>(&mut self, path: &str) -> Result<&mut Self, Error>
    where
        T: JsonClass + From<Object>,
    {
        let entry = self.entry_mut(path)?;
        entry.new = Some(Box::new(|object: Object| {
            Ok(Node::Class(Arc::new(T::from(object))))
        }));
        Ok(self)
    }

    /// Register an arbitrary "create from mapping" factory under `path`.
    ///
    /// The factory may return any node, not only a domain object.
    pub fn register_factory<F>(&mut self, path: &str, factory: F) -> Result<&mut Self, Error>
    where
        F: Fn(Object) -> Result<Node, Error> + Send + Sync + 'static,
    {
        let entry = self.entry_mut(path)?;
        entry.json_create = Some(Box::new(factory));
        Ok(self)
    }

    /// Resolve `path` segment by segment from the root.
    pub fn resolve(&self, path: &str) -> Result<&ClassEntry, Error> {
        let mut namespace = &self.root;
        let mut resolved: Vec<&str> = Vec::new();
        for segment in path.split(PATH_SEPARATOR) {
            if segment.is_empty() {
                return Err(Error::new(ErrorKind::Lookup)
                    .with_message("empty segment in class path")
                    .with_class(path));
            }
            namespace = namespace.children.get(segment).ok_or_else(|| {
                let scope = if resolved.is_empty() {
                    "the root namespace".to_string()
                } else {
                    format!("`{}`", resolved.join(PATH_SEPARATOR))
                };
                Error::new(ErrorKind::Lookup)
                    .with_message(format!("cannot resolve `{segment}` in {scope}"))
                    .with_hint("Register the class before decoding documents that name it.")
                    .with_class(path)
            })?;
            resolved.push(segment);
        }
        namespace.class.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Lookup)
                .with_message(format!("`{path}` is a namespace, not a class"))
                .with_class(path)
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Registered class paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_paths(&self.root, &mut paths);
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    fn entry_mut(&mut self, path: &str) -> Result<&mut ClassEntry, Error> {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("class path segments must not be empty")
                .with_class(path));
        }
        let mut namespace = &mut self.root;
        for segment in segments {
            namespace = namespace.children.entry(segment.to_string()).or_default();
        }
        Ok(namespace
            .class
            .get_or_insert_with(|| ClassEntry::new(path.to_string())))
    }
}

fn collect_paths(namespace: &Namespace, out: &mut Vec<String>) {
    for child in namespace.children.values() {
        if let Some(class) = &child.class {
            out.push(class.path.clone());
        }
        collect_paths(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonCreate, Registry};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::node::{JsonClass, Node, Object};

    #[derive(Debug)]
    struct Cookbook {
        fields: Object,
    }

    impl JsonClass for Cookbook {
        fn json_class(&self) -> &str {
            "Chef::Cookbook"
        }

        fn to_node(&self) -> Node {
            Node::Object(self.fields.clone())
        }
    }

    impl From<Object> for Cookbook {
        fn from(fields: Object) -> Self {
            Self { fields }
        }
    }

    impl JsonCreate for Cookbook {
        fn json_create(mut object: Object) -> Result<Self, Error> {
            object.insert("created".to_string(), Node::Bool(true));
            Ok(Self { fields: object })
        }
    }

    #[test]
    fn resolve_walks_nested_namespaces() {
        let mut registry = Registry::new();
        registry
            .register_new::<Cookbook>("Chef::Cookbook")
            .expect("register")
            .register_new::<Cookbook>("Chef::Cookbook::Version")
            .expect("register nested");

        assert_eq!(
            registry.resolve("Chef::Cookbook").expect("class").path(),
            "Chef::Cookbook"
        );
        assert!(registry.contains("Chef::Cookbook::Version"));
        assert_eq!(
            registry.paths(),
            ["Chef::Cookbook", "Chef::Cookbook::Version"]
        );
    }

    #[test]
    fn resolve_names_the_first_missing_segment() {
        let mut registry = Registry::new();
        registry
            .register_new::<Cookbook>("Chef::Cookbook")
            .expect("register");

        let err = registry.resolve("NoSuchNamespace::Nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert_eq!(
            err.message(),
            Some("cannot resolve `NoSuchNamespace` in the root namespace")
        );
        assert_eq!(err.class(), Some("NoSuchNamespace::Nope"));

        let err = registry.resolve("Chef::Recipe").unwrap_err();
        assert_eq!(err.message(), Some("cannot resolve `Recipe` in `Chef`"));
    }

    #[test]
    fn namespace_without_class_is_not_constructible() {
        let mut registry = Registry::new();
        registry
            .register_new::<Cookbook>("Chef::Cookbook")
            .expect("register");

        let err = registry.resolve("Chef").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert!(registry.resolve("Chef::::Cookbook").is_err());
        assert!(registry.resolve("").is_err());
    }

    #[test]
    fn empty_segments_are_rejected_at_registration() {
        let mut registry = Registry::new();
        let err = registry.register_new::<Cookbook>("::Cookbook").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(registry.is_empty());
    }

    #[test]
    fn json_create_wins_over_plain_constructor() {
        let mut registry = Registry::new();
        registry
            .register_new::<Cookbook>("Chef::Cookbook")
            .expect("register new")
            .register_json_create::<Cookbook>("Chef::Cookbook")
            .expect("register json_create");

        let entry = registry.resolve("Chef::Cookbook").expect("class");
        assert!(entry.has_json_create());
        let node = entry.construct(Object::new()).expect("construct");
        let cookbook = node.downcast_ref::<Cookbook>().expect("cookbook");
        assert_eq!(cookbook.fields.get("created"), Some(&Node::Bool(true)));
    }
}
