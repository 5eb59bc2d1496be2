//! CloudFormation intrinsic function helpers.

#![allow(dead_code)]

use serde_json::{Value, json};

/// `{"Ref": logical_id}`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [logical_id, attribute]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::Sub": expression}` using pseudo parameters only
pub fn sub(expression: &str) -> Value {
    json!({ "Fn::Sub": expression })
}

/// `{"Fn::Sub": [expression, variables]}` with a custom variable map
pub fn sub_with(expression: &str, variables: Value) -> Value {
    json!({ "Fn::Sub": [expression, variables] })
}

/// `{"Fn::ImportValue": name}`
pub fn import_value(name: &str) -> Value {
    json!({ "Fn::ImportValue": name })
}

/// `{"Fn::Join": [separator, parts]}`
pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// `{"Fn::Split": [separator, value]}`
pub fn split(separator: &str, value: Value) -> Value {
    json!({ "Fn::Split": [separator, value] })
}

/// `{"Fn::Select": [index, list]}`
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::GetAZs": ""}` for the current region
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsic_shapes() {
        assert_eq!(reference("Vpc"), json!({ "Ref": "Vpc" }));
        assert_eq!(
            get_att("Alb", "DNSName"),
            json!({ "Fn::GetAtt": ["Alb", "DNSName"] })
        );
        assert_eq!(
            select(1, get_azs()),
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
        assert_eq!(
            sub_with("${Name}", json!({ "Name": "x" })),
            json!({ "Fn::Sub": ["${Name}", { "Name": "x" }] })
        );
    }
}
