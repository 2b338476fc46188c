use serde::Serialize;
use serde_json::Value;

/// Function name used when no stack trace is available at all.
pub const UNKNOWN_FUNCTION: &str = "<unknown function>";

/// Function name used when a trace exists but names no function.
pub const NO_FUNCTION: &str = "<none>";

/// Source location attached to entries so Error Reporting can group them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<Value>,
    pub function_name: String,
}

/// Format the function name from the first frame of a stack trace.
///
/// Produces `function` for free functions, `Class->function` for instance
/// calls and `Class::function` for static calls: the frame's `class`,
/// `type` and `function` fields concatenated in that order, each part only
/// when present.
pub fn function_name_for_report(trace: Option<&[Value]>) -> String {
    let Some(trace) = trace else {
        return UNKNOWN_FUNCTION.to_string();
    };

    let Some(frame) = trace.first() else {
        return NO_FUNCTION.to_string();
    };

    let function = match frame_part(frame, "function") {
        Some(f) if !f.is_empty() => f,
        _ => return NO_FUNCTION.to_string(),
    };

    let mut name = String::new();
    if let Some(class) = frame_part(frame, "class") {
        name.push_str(&class);
    }
    if let Some(call_type) = frame_part(frame, "type") {
        name.push_str(&call_type);
    }
    name.push_str(&function);
    name
}

fn frame_part(frame: &Value, key: &str) -> Option<String> {
    match frame.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instance_call_is_class_type_function() {
        let trace = [json!({"function": "f", "type": "->", "class": "C"})];
        assert_eq!(function_name_for_report(Some(&trace)), "C->f");
    }

    #[test]
    fn static_call_and_free_function() {
        let statik = [json!({"function": "boot", "type": "::", "class": "App\\Kernel"})];
        assert_eq!(function_name_for_report(Some(&statik)), "App\\Kernel::boot");

        let free = [json!({"function": "main"})];
        assert_eq!(function_name_for_report(Some(&free)), "main");
    }

    #[test]
    fn missing_trace_is_unknown_function() {
        assert_eq!(function_name_for_report(None), UNKNOWN_FUNCTION);
    }

    #[test]
    fn frame_without_function_is_none() {
        assert_eq!(function_name_for_report(Some(&[json!({"class": "C"})])), NO_FUNCTION);
        assert_eq!(function_name_for_report(Some(&[json!({"function": ""})])), NO_FUNCTION);
        assert_eq!(function_name_for_report(Some(&[])), NO_FUNCTION);
    }

    #[test]
    fn only_first_frame_is_used() {
        let trace = [json!({"function": "inner"}), json!({"function": "outer", "class": "X"})];
        assert_eq!(function_name_for_report(Some(&trace)), "inner");
    }

    #[test]
    fn location_serializes_camel_case() {
        let loc = ReportLocation {
            file_path: Some(json!("/a.rs")),
            line_number: Some(json!(10)),
            function_name: NO_FUNCTION.to_string(),
        };
        assert_eq!(
            serde_json::to_value(&loc).unwrap(),
            json!({"filePath": "/a.rs", "lineNumber": 10, "functionName": "<none>"})
        );
    }
}
