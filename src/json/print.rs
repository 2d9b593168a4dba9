use core::fmt::Write;

use super::Value;

/// Serializes a tree to compact JSON text.
pub fn print(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Serializes a tree to pretty-printed JSON text, tab-indented.
pub fn print_pretty(value: &Value) -> String {
    let mut out = String::new();
    write_value_pretty(value, 0, &mut out);
    out.push('\n');
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(*n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(members) => {
            out.push('{');
            for (i, (key, item)) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_value_pretty(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(",\n");
                }
                indent(depth + 1, out);
                write_value_pretty(item, depth + 1, out);
            }
            out.push('\n');
            indent(depth, out);
            out.push(']');
        }
        Value::Object(members) if !members.is_empty() => {
            out.push_str("{\n");
            for (i, (key, item)) in members.iter().enumerate() {
                if i > 0 {
                    out.push_str(",\n");
                }
                indent(depth + 1, out);
                write_string(key, out);
                out.push_str(": ");
                write_value_pretty(item, depth + 1, out);
            }
            out.push('\n');
            indent(depth, out);
            out.push('}');
        }
        other => write_value(other, out),
    }
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push('\t');
    }
}

// Exactly-integral values within the f64-exact integer range print without a
// fractional part; everything else uses the shortest round-trip decimal form.
// Non-finite values have no JSON representation and print as null.
fn write_number(n: f64, out: &mut String) {
    if !n.is_finite() {
        out.push_str("null");
        return;
    }
    if n == n.trunc() && n.abs() <= 9.007_199_254_740_992e15 {
        let _ = write!(out, "{}", n as i64);
    } else {
        let _ = write!(out, "{}", n);
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn request() -> Value {
        let mut body = Value::object();
        body.add("x", 1);
        let mut req = Value::object();
        req.add("req", "note.add");
        req.add("file", "data.qo");
        req.add("body", body);
        req
    }

    #[test]
    fn test_print_compact() {
        assert_eq!(
            print(&request()),
            r#"{"req":"note.add","file":"data.qo","body":{"x":1}}"#
        );
    }

    #[test]
    fn test_print_scalars() {
        assert_eq!(print(&Value::Null), "null");
        assert_eq!(print(&Value::Bool(true)), "true");
        assert_eq!(print(&Value::Number(0.0)), "0");
        assert_eq!(print(&Value::Number(-3.0)), "-3");
        assert_eq!(print(&Value::Number(0.25)), "0.25");
        assert_eq!(print(&Value::String("".into())), "\"\"");
        assert_eq!(print(&Value::object()), "{}");
        assert_eq!(print(&Value::array()), "[]");
    }

    #[test]
    fn test_print_nonfinite_as_null() {
        assert_eq!(print(&Value::Number(f64::NAN)), "null");
        assert_eq!(print(&Value::Number(f64::INFINITY)), "null");
    }

    #[test]
    fn test_print_escapes() {
        let v = Value::String("a\"b\\c\n\u{1}".into());
        assert_eq!(print(&v), r#""a\"b\\c\n\u0001""#);
    }

    #[test]
    fn test_number_round_trip() {
        for n in [0.1, 1.0 / 3.0, 1e-7, 6.02e23, 123456789.123456] {
            let text = print(&Value::Number(n));
            assert_eq!(parse(&text).unwrap().as_f64(), Some(n));
        }
    }

    #[test]
    fn test_round_trip_tree() {
        let doc = request();
        let reparsed = parse(&print(&doc)).unwrap();
        assert!(reparsed.compare(&doc, true));
    }

    #[test]
    fn test_pretty_reparses_equal() {
        let doc = request();
        let reparsed = parse(&print_pretty(&doc)).unwrap();
        assert!(reparsed.compare(&doc, true));
    }
}
