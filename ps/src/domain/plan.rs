//! StructuredPlan - the project plan synthesized from the dialogue
//!
//! Every field defaults to empty so a partial payload from the synthesis
//! model deserializes into a complete document. Wire names are camelCase.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// The synthesized project plan. One live instance per session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StructuredPlan {
    pub title: String,
    pub overview: Overview,
    pub features: Vec<FeatureGroup>,
    pub scope: Scope,
    pub timeline: Timeline,
    pub tasks: Vec<TaskPhase>,
    pub resources: Resources,
    pub risks: Vec<Risk>,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Overview {
    pub summary: String,
    pub objectives: Vec<String>,
    pub success_criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureGroup {
    pub category: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeline {
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestone {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPhase {
    pub phase: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub tools: Vec<String>,
    pub people: Vec<String>,
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Risk {
    pub risk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

/// Strip `null` object members and array elements, recursively
///
/// Models sometimes emit `null` for a field they have nothing for. serde's
/// `default` only covers absent fields, so nulls are removed first and both
/// cases land on the empty default.
pub fn normalize_payload(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, normalize_payload(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(normalize_payload)
                .collect(),
        ),
        other => other,
    }
}

impl StructuredPlan {
    /// Build a plan from a raw synthesis payload
    ///
    /// Returns `None` when the payload is not an object or its fields have the
    /// wrong shape. Missing and null fields become empty defaults.
    pub fn from_payload(payload: Value) -> Option<Self> {
        debug!("StructuredPlan::from_payload: called");
        if !payload.is_object() {
            debug!("StructuredPlan::from_payload: payload is not an object");
            return None;
        }
        match serde_json::from_value(normalize_payload(payload)) {
            Ok(plan) => Some(plan),
            Err(e) => {
                debug!(error = %e, "StructuredPlan::from_payload: shape mismatch");
                None
            }
        }
    }

    /// True when the plan carries no title and no content at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Render the plan as a markdown document
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        let title = if self.title.trim().is_empty() {
            "Untitled Project"
        } else {
            self.title.as_str()
        };
        let _ = writeln!(md, "# {}\n", title);

        md.push_str("## Overview\n\n");
        if !self.overview.summary.is_empty() {
            let _ = writeln!(md, "{}\n", self.overview.summary);
        }
        push_list(&mut md, "### Objectives", &self.overview.objectives);
        push_list(&mut md, "### Success Criteria", &self.overview.success_criteria);

        md.push_str("## Features\n\n");
        if self.features.is_empty() {
            md.push_str("_None listed._\n\n");
        }
        for group in &self.features {
            push_list(&mut md, &format!("### {}", group.category), &group.items);
        }

        md.push_str("## Scope\n\n");
        push_list(&mut md, "### Included", &self.scope.included);
        push_list(&mut md, "### Excluded", &self.scope.excluded);

        md.push_str("## Timeline\n\n");
        if self.timeline.milestones.is_empty() {
            md.push_str("_None listed._\n\n");
        } else {
            for milestone in &self.timeline.milestones {
                let _ = write!(md, "- **{}**", milestone.name);
                if let Some(deadline) = &milestone.deadline {
                    let _ = write!(md, " ({})", deadline);
                }
                if let Some(description) = &milestone.description {
                    let _ = write!(md, ": {}", description);
                }
                md.push('\n');
            }
            md.push('\n');
        }

        md.push_str("## Tasks\n\n");
        if self.tasks.is_empty() {
            md.push_str("_None listed._\n\n");
        }
        for phase in &self.tasks {
            push_list(&mut md, &format!("### {}", phase.phase), &phase.items);
        }

        md.push_str("## Resources\n\n");
        push_list(&mut md, "### Tools", &self.resources.tools);
        push_list(&mut md, "### People", &self.resources.people);
        push_list(&mut md, "### Materials", &self.resources.materials);

        md.push_str("## Risks\n\n");
        if self.risks.is_empty() {
            md.push_str("_None listed._\n\n");
        } else {
            for risk in &self.risks {
                let _ = write!(md, "- {}", risk.risk);
                if let Some(mitigation) = &risk.mitigation {
                    let _ = write!(md, " (mitigation: {})", mitigation);
                }
                md.push('\n');
            }
            md.push('\n');
        }

        push_list(&mut md, "## Next Steps", &self.next_steps);

        md
    }
}

fn push_list(md: &mut String, heading: &str, items: &[String]) {
    let _ = writeln!(md, "{}\n", heading);
    if items.is_empty() {
        md.push_str("_None listed._\n\n");
        return;
    }
    for item in items {
        let _ = writeln!(md, "- {}", item);
    }
    md.push('\n');
}
