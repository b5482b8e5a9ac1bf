//! Purpose: Render a decoded tree as indented JSON with optional ANSI color.
//! Exports: colorize_node.
//! Role: Pure formatter behind `fmt --pretty` when stdout is a terminal.
//! Invariants: Uncolored output is byte-identical to serde_json::to_string_pretty.
//! Invariants: Domain objects render as their `to_node` form.
use json_facade::api::Node;

#[derive(Clone, Copy)]
enum Tone {
    Key,
    Str,
    Number,
    Literal,
    Plain,
}

impl Tone {
    fn sgr(self) -> &'static str {
        match self {
            Tone::Key => "36",
            Tone::Str => "32",
            Tone::Number => "33",
            Tone::Literal => "35",
            Tone::Plain => "39",
        }
    }
}

struct Painter {
    color: bool,
    out: String,
}

impl Painter {
    fn paint(&mut self, text: &str, tone: Tone) {
        if self.color {
            self.out.push_str("\u{1b}[");
            self.out.push_str(tone.sgr());
            self.out.push('m');
            self.out.push_str(text);
            self.out.push_str("\u{1b}[0m");
        } else {
            self.out.push_str(text);
        }
    }

    fn newline(&mut self, depth: usize) {
        self.out.push('\n');
        self.out.push_str(&"  ".repeat(depth));
    }

    fn node(&mut self, node: &Node, depth: usize) {
        match node {
            Node::Null => self.paint("null", Tone::Plain),
            Node::Bool(flag) => self.paint(if *flag { "true" } else { "false" }, Tone::Literal),
            Node::Number(num) => self.paint(&num.to_string(), Tone::Number),
            Node::String(text) => self.paint(&quoted(text), Tone::Str),
            Node::Array(items) => {
                self.container(('[', ']'), items.iter().map(|item| (None, item)), depth)
            }
            Node::Object(map) => self.container(
                ('{', '}'),
                map.iter().map(|(key, value)| (Some(key.as_str()), value)),
                depth,
            ),
            Node::Class(class) => self.node(&class.to_node(), depth),
        }
    }

    fn container<'a>(
        &mut self,
        (open, close): (char, char),
        entries: impl ExactSizeIterator<Item = (Option<&'a str>, &'a Node)>,
        depth: usize,
    ) {
        if entries.len() == 0 {
            self.paint(&format!("{open}{close}"), Tone::Plain);
            return;
        }
        self.paint(open.encode_utf8(&mut [0; 4]), Tone::Plain);
        for (idx, (key, value)) in entries.enumerate() {
            if idx > 0 {
                self.paint(",", Tone::Plain);
            }
            self.newline(depth + 1);
            if let Some(key) = key {
                self.paint(&quoted(key), Tone::Key);
                self.paint(":", Tone::Plain);
                self.out.push(' ');
            }
            self.node(value, depth + 1);
        }
        self.newline(depth);
        self.paint(close.encode_utf8(&mut [0; 4]), Tone::Plain);
    }
}

fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

pub fn colorize_node(value: &Node, use_color: bool) -> String {
    let mut painter = Painter {
        color: use_color,
        out: String::new(),
    };
    painter.node(value, 0);
    painter.out
}

#[cfg(test)]
mod tests {
    use super::colorize_node;
    use json_facade::api::{JsonClass, Node, Object};
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Marker;

    impl JsonClass for Marker {
        fn json_class(&self) -> &str {
            "Demo::Marker"
        }

        fn to_node(&self) -> Node {
            Node::tagged(self.json_class(), Object::new())
        }
    }

    #[test]
    fn plain_rendering_equals_serde_pretty() {
        let value = Node::from(json!({
            "arr": [1, true, null, []],
            "nested": { "x": "y\n" },
            "empty": {}
        }));
        let expected = serde_json::to_string_pretty(&value).expect("pretty");
        assert_eq!(colorize_node(&value, false), expected);
    }

    #[test]
    fn colored_rendering_wraps_tokens_in_sgr() {
        let colored = colorize_node(&Node::from(json!({"k":"v","n":1,"b":true,"z":null})), true);
        for token in [
            "\u{1b}[36m\"k\"\u{1b}[0m",
            "\u{1b}[32m\"v\"\u{1b}[0m",
            "\u{1b}[33m1\u{1b}[0m",
            "\u{1b}[35mtrue\u{1b}[0m",
            "\u{1b}[39mnull\u{1b}[0m",
        ] {
            assert!(colored.contains(token), "{token:?} missing from {colored:?}");
        }
    }

    #[test]
    fn domain_objects_render_through_to_node() {
        let value = Node::from(vec![Node::from(Arc::new(Marker))]);
        assert_eq!(
            colorize_node(&value, false),
            "[\n  {\n    \"json_class\": \"Demo::Marker\"\n  }\n]"
        );
    }
}
