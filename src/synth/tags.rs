//! Standard resource tags applied across every stack.

use serde_json::{Value, json};

/// Tag set shared by every taggable resource
pub fn standard_tags(app_name: &str, environment: &str) -> Value {
    json!([
        { "Key": "Application", "Value": app_name },
        { "Key": "Environment", "Value": environment },
        { "Key": "ManagedBy", "Value": "groundwork" }
    ])
}

/// Standard tags plus a `Name` tag, for EC2 resources that surface it
pub fn named_tags(app_name: &str, environment: &str, name: &str) -> Value {
    let mut tags = standard_tags(app_name, environment);
    if let Value::Array(items) = &mut tags {
        items.push(json!({ "Key": "Name", "Value": name }));
    }
    tags
}
