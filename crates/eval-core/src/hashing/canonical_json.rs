//! JSON canónico: claves de objetos ordenadas, sin espacios. Base del
//! `graph_hash` del job graph.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let tree: BTreeMap<&String, String> = map.iter().map(|(k, v)| (k, to_canonical_json(v))).collect();
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", quote(k), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

fn quote(s: &str) -> String {
    // Serializar un &str a JSON no puede fallar.
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let a = json!({"b": 1, "a": [true, null, "x"]});
        assert_eq!(to_canonical_json(&a), r#"{"a":[true,null,"x"],"b":1}"#);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = json!({"x": {"k2": 2, "k1": 1}, "y": 0});
        let b = json!({"y": 0, "x": {"k1": 1, "k2": 2}});
        assert_eq!(to_canonical_json(&a), to_canonical_json(&b));
    }
}
