//! Dot-path codec for diff keys
//!
//! Nested field paths are stored as a single string joined with `.`. A
//! literal `.` inside a segment is written `\.` and a literal `\` is written
//! `\\`, so `parse(escape(segments)) == segments` for every non-empty list.

use serde_json::{Map, Value};

const SEPARATOR: char = '.';
const ESCAPE: char = '\\';

/// Join path segments into one escaped key
pub fn escape<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        for c in segment.as_ref().chars() {
            if c == SEPARATOR || c == ESCAPE {
                out.push(ESCAPE);
            }
            out.push(c);
        }
    }
    out
}

/// Split an escaped key back into its segments
///
/// A trailing lone `\` is kept as a literal backslash.
pub fn parse(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => current.push(chars.next().unwrap_or(ESCAPE)),
            SEPARATOR => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Set `value` at `segments` inside `root`, creating maps along the way
///
/// A non-map value sitting on the prefix is replaced by a new map.
pub fn set_at_path<S: AsRef<str>>(root: &mut Map<String, Value>, segments: &[S], value: Value) {
    let Some((last, prefix)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in prefix {
        let entry = current
            .entry(segment.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just made an object"),
        };
    }
    current.insert(last.as_ref().to_string(), value);
}

/// Turn a map keyed by escaped paths into a nested structure
///
/// `{"user.name": "Alice"}` becomes `{"user": {"name": "Alice"}}`.
pub fn unflatten(data: &Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in data {
        set_at_path(&mut result, &parse(key), value.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_escape_plain() {
        assert_eq!(escape(&["user", "name"]), "user.name");
    }

    #[test]
    fn test_escape_literal_dot() {
        assert_eq!(escape(&["ver.1", "active"]), "ver\\.1.active");
        assert_eq!(parse("ver\\.1.active"), vec!["ver.1", "active"]);
    }

    #[test]
    fn test_backslash_at_segment_end() {
        let segments = vec!["a\\".to_string(), "b".to_string()];
        let path = escape(&segments);
        assert_eq!(path, "a\\\\.b");
        assert_eq!(parse(&path), segments);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse(""), vec![""]);
        assert_eq!(parse("a..b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_set_at_path_creates_maps() {
        let mut root = Map::new();
        set_at_path(&mut root, &["a", "b", "c"], json!(1));
        assert_eq!(Value::Object(root), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_set_at_path_overwrites_scalar_prefix() {
        let mut root = json!({"a": 5}).as_object().cloned().unwrap();
        set_at_path(&mut root, &["a", "b"], json!(true));
        assert_eq!(Value::Object(root), json!({"a": {"b": true}}));
    }

    #[test]
    fn test_unflatten() {
        let flat = json!({"name": "Alice", "profile.bio": "Hi", "v\\.1.on": true});
        let nested = unflatten(flat.as_object().unwrap());
        assert_eq!(
            Value::Object(nested),
            json!({"name": "Alice", "profile": {"bio": "Hi"}, "v.1": {"on": true}})
        );
    }

    proptest! {
        #[test]
        fn escape_parse_round_trip(segments in prop::collection::vec(".*", 1..6)) {
            prop_assert_eq!(parse(&escape(&segments)), segments);
        }

        #[test]
        fn dotted_segments_round_trip(segments in prop::collection::vec("[a-z.\\\\]{0,6}", 1..6)) {
            prop_assert_eq!(parse(&escape(&segments)), segments);
        }
    }
}
