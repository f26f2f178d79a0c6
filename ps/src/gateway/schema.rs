//! JSON schema describing StructuredPlan for the synthesis tool

use serde_json::{Value, json};

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn named_list(name_field: &str) -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                name_field: { "type": "string" },
                "items": string_list(),
            },
            "required": [name_field, "items"],
        }
    })
}

/// Input schema for the `record_project_plan` tool
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string", "description": "A catchy title for the project" },
            "overview": {
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "objectives": string_list(),
                    "successCriteria": string_list(),
                },
                "required": ["summary", "objectives", "successCriteria"],
            },
            "features": named_list("category"),
            "scope": {
                "type": "object",
                "properties": {
                    "included": string_list(),
                    "excluded": string_list(),
                },
                "required": ["included", "excluded"],
            },
            "timeline": {
                "type": "object",
                "properties": {
                    "milestones": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "deadline": { "type": "string" },
                                "description": { "type": "string" },
                            },
                            "required": ["name"],
                        }
                    }
                },
                "required": ["milestones"],
            },
            "tasks": named_list("phase"),
            "resources": {
                "type": "object",
                "properties": {
                    "tools": string_list(),
                    "people": string_list(),
                    "materials": string_list(),
                },
                "required": ["tools", "people", "materials"],
            },
            "risks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "risk": { "type": "string" },
                        "mitigation": { "type": "string" },
                    },
                    "required": ["risk"],
                }
            },
            "nextSteps": string_list(),
        },
        "required": ["title", "overview", "features", "scope", "timeline", "tasks", "resources", "risks", "nextSteps"],
    })
}
