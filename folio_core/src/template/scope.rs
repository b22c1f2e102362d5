//! Variable lookup through nested section scopes

use serde_json::Value;

/// Current element of one enclosing section
#[derive(Debug, Clone)]
struct Frame<'v> {
    name: String,
    value: &'v Value,
}

/// Stack of section elements over the top-level variables
#[derive(Debug, Clone)]
pub struct Scope<'v> {
    root: &'v Value,
    frames: Vec<Frame<'v>>,
}

impl<'v> Scope<'v> {
    pub fn new(root: &'v Value) -> Self {
        Scope {
            root,
            frames: Vec::new(),
        }
    }

    /// Scope for one rendering of section `name`; `None` renders without a new element
    pub fn enter(&self, name: &str, value: Option<&'v Value>) -> Scope<'v> {
        let mut scope = self.clone();
        if let Some(value) = value {
            scope.frames.push(Frame {
                name: name.to_string(),
                value,
            });
        }
        scope
    }

    /// Resolves a dotted name: innermost element first, then outer ones, then the top level
    ///
    /// Inside section `items`, `items.price` and `price` both name the current
    /// element's `price`.
    pub fn lookup(&self, name: &str) -> Option<&'v Value> {
        if name == "." {
            return Some(self.frames.last().map_or(self.root, |f| f.value));
        }
        let segments: Vec<&str> = name.split('.').collect();
        for frame in self.frames.iter().rev() {
            if let Some(value) = walk(frame.value, &segments) {
                return Some(value);
            }
            if segments[0] == frame.name {
                if let Some(value) = walk(frame.value, &segments[1..]) {
                    return Some(value);
                }
            }
        }
        walk(self.root, &segments)
    }
}

fn walk<'v>(value: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// JavaScript truthiness; an empty array is falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Elements a section renders with, one per copy
///
/// Arrays give one copy per element; other truthy values one copy scoped to the
/// value. An inverted section renders once, without a new element, when the value
/// is absent or falsy.
pub fn section_elements<'v>(value: Option<&'v Value>, inverted: bool) -> Vec<Option<&'v Value>> {
    let truthy = value.map_or(false, is_truthy);
    if inverted {
        return if truthy { Vec::new() } else { vec![None] };
    }
    match value {
        Some(Value::Array(items)) => items.iter().map(Some).collect(),
        Some(v) if truthy => vec![Some(v)],
        _ => Vec::new(),
    }
}

/// Text a value renders as
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_prefers_innermost_element() {
        let root = json!({
            "name": "top",
            "company": {"name": "Acme"},
            "items": [{"name": "Pen", "price": 1}]
        });
        let scope = Scope::new(&root);
        assert_eq!(scope.lookup("name"), Some(&json!("top")));
        assert_eq!(scope.lookup("company.name"), Some(&json!("Acme")));

        let item = &root["items"][0];
        let inner = scope.enter("items", Some(item));
        assert_eq!(inner.lookup("name"), Some(&json!("Pen")));
        assert_eq!(inner.lookup("items.price"), Some(&json!(1)));
        assert_eq!(inner.lookup("."), Some(item));
        // falls back to the top level
        assert_eq!(inner.lookup("company.name"), Some(&json!("Acme")));
        assert_eq!(inner.lookup("missing"), None);
        assert_eq!(scope.lookup("items.0.name"), Some(&json!("Pen")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!(-1.5)));
    }

    #[test]
    fn test_section_elements() {
        let items = json!([1, 2, 3]);
        assert_eq!(section_elements(Some(&items), false).len(), 3);
        assert_eq!(section_elements(Some(&items), true).len(), 0);
        assert_eq!(section_elements(Some(&json!(true)), false), vec![Some(&json!(true))]);
        assert!(section_elements(Some(&json!(false)), false).is_empty());
        assert!(section_elements(None, false).is_empty());
        assert_eq!(section_elements(None, true), vec![None]);
        assert_eq!(section_elements(Some(&json!([])), true), vec![None]);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!("a")), "a");
        assert_eq!(to_text(&json!(2)), "2");
        assert_eq!(to_text(&json!(2.5)), "2.5");
        assert_eq!(to_text(&json!(false)), "false");
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!([1, 2])), "[1,2]");
    }
}
