//! PlanEdit - list-editing primitives applied to a plan copy
//!
//! Entries are addressed by index. Removing an entry shifts every later index
//! down by one, the same rule for string items and whole sub-objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{FeatureGroup, Milestone, Risk, StructuredPlan, TaskPhase};

/// Errors from applying an edit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange { what: &'static str, index: usize, len: usize },

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// A string list inside the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "list", content = "index")]
pub enum ListField {
    Objectives,
    SuccessCriteria,
    Included,
    Excluded,
    Tools,
    People,
    Materials,
    NextSteps,
    /// Items of the feature group at this index
    FeatureItems(usize),
    /// Items of the task phase at this index
    TaskItems(usize),
}

/// A list of whole sub-objects inside the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Features,
    Milestones,
    TaskPhases,
    Risks,
}

/// One structural change to a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum PlanEdit {
    SetTitle { value: String },
    SetSummary { value: String },
    AppendItem { list: ListField },
    UpdateItem { list: ListField, index: usize, value: String },
    RemoveItem { list: ListField, index: usize },
    MoveItem { list: ListField, from: usize, to: usize },
    AddSection { section: Section },
    RemoveSection { section: Section, index: usize },
    SetFeatureCategory { index: usize, value: String },
    SetMilestoneName { index: usize, value: String },
    SetMilestoneDeadline { index: usize, value: String },
    SetMilestoneDescription { index: usize, value: String },
    SetTaskPhaseName { index: usize, value: String },
    SetRisk { index: usize, value: String },
    SetRiskMitigation { index: usize, value: String },
}

impl PlanEdit {
    /// Apply the edit in place. On error the plan is left unchanged.
    pub fn apply(&self, plan: &mut StructuredPlan) -> Result<(), EditError> {
        match self {
            PlanEdit::SetTitle { value } => plan.title = value.clone(),
            PlanEdit::SetSummary { value } => plan.overview.summary = value.clone(),
            PlanEdit::AppendItem { list } => list_mut(plan, *list)?.push(String::new()),
            PlanEdit::UpdateItem { list, index, value } => {
                let items = list_mut(plan, *list)?;
                *entry_mut(items, *index, list.name())? = value.clone();
            }
            PlanEdit::RemoveItem { list, index } => {
                let items = list_mut(plan, *list)?;
                check_index(*index, items.len(), list.name())?;
                items.remove(*index);
            }
            PlanEdit::MoveItem { list, from, to } => {
                let items = list_mut(plan, *list)?;
                check_index(*from, items.len(), list.name())?;
                check_index(*to, items.len(), list.name())?;
                let item = items.remove(*from);
                items.insert(*to, item);
            }
            PlanEdit::AddSection { section } => match section {
                Section::Features => plan.features.push(FeatureGroup::default()),
                Section::Milestones => plan.timeline.milestones.push(Milestone::default()),
                Section::TaskPhases => plan.tasks.push(TaskPhase::default()),
                Section::Risks => plan.risks.push(Risk::default()),
            },
            PlanEdit::RemoveSection { section, index } => {
                let index = *index;
                let what = section.name();
                match section {
                    Section::Features => remove_at(&mut plan.features, index, what)?,
                    Section::Milestones => remove_at(&mut plan.timeline.milestones, index, what)?,
                    Section::TaskPhases => remove_at(&mut plan.tasks, index, what)?,
                    Section::Risks => remove_at(&mut plan.risks, index, what)?,
                }
            }
            PlanEdit::SetFeatureCategory { index, value } => {
                entry_mut(&mut plan.features, *index, "feature group")?.category = value.clone();
            }
            PlanEdit::SetMilestoneName { index, value } => {
                entry_mut(&mut plan.timeline.milestones, *index, "milestone")?.name = value.clone();
            }
            PlanEdit::SetMilestoneDeadline { index, value } => {
                entry_mut(&mut plan.timeline.milestones, *index, "milestone")?.deadline = optional(value);
            }
            PlanEdit::SetMilestoneDescription { index, value } => {
                entry_mut(&mut plan.timeline.milestones, *index, "milestone")?.description = optional(value);
            }
            PlanEdit::SetTaskPhaseName { index, value } => {
                entry_mut(&mut plan.tasks, *index, "task phase")?.phase = value.clone();
            }
            PlanEdit::SetRisk { index, value } => {
                entry_mut(&mut plan.risks, *index, "risk")?.risk = value.clone();
            }
            PlanEdit::SetRiskMitigation { index, value } => {
                entry_mut(&mut plan.risks, *index, "risk")?.mitigation = optional(value);
            }
        }
        Ok(())
    }
}

impl ListField {
    fn name(&self) -> &'static str {
        match self {
            ListField::Objectives => "objectives",
            ListField::SuccessCriteria => "success-criteria",
            ListField::Included => "included",
            ListField::Excluded => "excluded",
            ListField::Tools => "tools",
            ListField::People => "people",
            ListField::Materials => "materials",
            ListField::NextSteps => "next-steps",
            ListField::FeatureItems(_) => "feature items",
            ListField::TaskItems(_) => "task items",
        }
    }
}

impl fmt::Display for ListField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListField::FeatureItems(i) => write!(f, "feature:{}", i),
            ListField::TaskItems(i) => write!(f, "task:{}", i),
            other => f.write_str(other.name()),
        }
    }
}

/// Parses `objectives`, `next-steps`, `feature:<i>`, `task:<i>` and friends
impl FromStr for ListField {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((kind, index)) = s.split_once(':') {
            let index: usize = index.parse().map_err(|_| EditError::UnknownField(s.to_string()))?;
            return match kind {
                "feature" => Ok(ListField::FeatureItems(index)),
                "task" => Ok(ListField::TaskItems(index)),
                _ => Err(EditError::UnknownField(s.to_string())),
            };
        }
        match s {
            "objectives" => Ok(ListField::Objectives),
            "success-criteria" | "criteria" => Ok(ListField::SuccessCriteria),
            "included" => Ok(ListField::Included),
            "excluded" => Ok(ListField::Excluded),
            "tools" => Ok(ListField::Tools),
            "people" => Ok(ListField::People),
            "materials" => Ok(ListField::Materials),
            "next-steps" | "next" => Ok(ListField::NextSteps),
            _ => Err(EditError::UnknownField(s.to_string())),
        }
    }
}

impl Section {
    fn name(&self) -> &'static str {
        match self {
            Section::Features => "feature group",
            Section::Milestones => "milestone",
            Section::TaskPhases => "task phase",
            Section::Risks => "risk",
        }
    }
}

impl FromStr for Section {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "features" | "feature" => Ok(Section::Features),
            "milestones" | "milestone" => Ok(Section::Milestones),
            "tasks" | "task" | "phases" => Ok(Section::TaskPhases),
            "risks" | "risk" => Ok(Section::Risks),
            _ => Err(EditError::UnknownField(s.to_string())),
        }
    }
}

fn list_mut(plan: &mut StructuredPlan, list: ListField) -> Result<&mut Vec<String>, EditError> {
    Ok(match list {
        ListField::Objectives => &mut plan.overview.objectives,
        ListField::SuccessCriteria => &mut plan.overview.success_criteria,
        ListField::Included => &mut plan.scope.included,
        ListField::Excluded => &mut plan.scope.excluded,
        ListField::Tools => &mut plan.resources.tools,
        ListField::People => &mut plan.resources.people,
        ListField::Materials => &mut plan.resources.materials,
        ListField::NextSteps => &mut plan.next_steps,
        ListField::FeatureItems(i) => &mut entry_mut(&mut plan.features, i, "feature group")?.items,
        ListField::TaskItems(i) => &mut entry_mut(&mut plan.tasks, i, "task phase")?.items,
    })
}

fn check_index(index: usize, len: usize, what: &'static str) -> Result<(), EditError> {
    if index >= len {
        return Err(EditError::IndexOutOfRange { what, index, len });
    }
    Ok(())
}

fn entry_mut<'a, T>(items: &'a mut [T], index: usize, what: &'static str) -> Result<&'a mut T, EditError> {
    let len = items.len();
    items.get_mut(index).ok_or(EditError::IndexOutOfRange { what, index, len })
}

fn remove_at<T>(items: &mut Vec<T>, index: usize, what: &'static str) -> Result<(), EditError> {
    check_index(index, items.len(), what)?;
    items.remove(index);
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> StructuredPlan {
        let mut plan = StructuredPlan {
            title: "Shed".to_string(),
            ..Default::default()
        };
        plan.overview.objectives = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        plan.features.push(FeatureGroup {
            category: "Structure".to_string(),
            items: vec!["Walls".to_string()],
        });
        plan
    }

    #[test]
    fn test_append_item_adds_empty_entry() {
        let mut p = plan();
        PlanEdit::AppendItem {
            list: ListField::NextSteps,
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.next_steps, vec![String::new()]);
    }

    #[test]
    fn test_remove_item_shifts_indices() {
        let mut p = plan();
        PlanEdit::RemoveItem {
            list: ListField::Objectives,
            index: 0,
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.overview.objectives, vec!["b".to_string(), "c".to_string()]);

        PlanEdit::UpdateItem {
            list: ListField::Objectives,
            index: 1,
            value: "C".to_string(),
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.overview.objectives, vec!["b".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_move_item() {
        let mut p = plan();
        PlanEdit::MoveItem {
            list: ListField::Objectives,
            from: 2,
            to: 0,
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.overview.objectives, vec!["c".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_out_of_range_leaves_plan_unchanged() {
        let mut p = plan();
        let before = p.clone();

        let err = PlanEdit::RemoveItem {
            list: ListField::Objectives,
            index: 3,
        }
        .apply(&mut p)
        .unwrap_err();
        assert_eq!(
            err,
            EditError::IndexOutOfRange {
                what: "objectives",
                index: 3,
                len: 3
            }
        );

        let err = PlanEdit::AppendItem {
            list: ListField::TaskItems(0),
        }
        .apply(&mut p)
        .unwrap_err();
        assert!(matches!(err, EditError::IndexOutOfRange { what: "task phase", .. }));

        assert!(
            PlanEdit::MoveItem {
                list: ListField::Objectives,
                from: 0,
                to: 7
            }
            .apply(&mut p)
            .is_err()
        );
        assert_eq!(p, before);
    }

    #[test]
    fn test_sections_add_and_remove() {
        let mut p = plan();
        PlanEdit::AddSection {
            section: Section::Milestones,
        }
        .apply(&mut p)
        .unwrap();
        PlanEdit::SetMilestoneName {
            index: 0,
            value: "Foundation".to_string(),
        }
        .apply(&mut p)
        .unwrap();
        PlanEdit::SetMilestoneDeadline {
            index: 0,
            value: "May".to_string(),
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.timeline.milestones[0].deadline.as_deref(), Some("May"));

        PlanEdit::SetMilestoneDeadline {
            index: 0,
            value: "  ".to_string(),
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.timeline.milestones[0].deadline, None);

        PlanEdit::RemoveSection {
            section: Section::Features,
            index: 0,
        }
        .apply(&mut p)
        .unwrap();
        assert!(p.features.is_empty());
    }

    #[test]
    fn test_nested_feature_items() {
        let mut p = plan();
        PlanEdit::AppendItem {
            list: ListField::FeatureItems(0),
        }
        .apply(&mut p)
        .unwrap();
        PlanEdit::UpdateItem {
            list: ListField::FeatureItems(0),
            index: 1,
            value: "Roof".to_string(),
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.features[0].items, vec!["Walls".to_string(), "Roof".to_string()]);
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!("next-steps".parse::<ListField>().unwrap(), ListField::NextSteps);
        assert_eq!("feature:2".parse::<ListField>().unwrap(), ListField::FeatureItems(2));
        assert_eq!("task:0".parse::<ListField>().unwrap(), ListField::TaskItems(0));
        assert!("feature:x".parse::<ListField>().is_err());
        assert!("budget".parse::<ListField>().is_err());
        assert_eq!("risks".parse::<Section>().unwrap(), Section::Risks);
        assert_eq!(ListField::FeatureItems(2).to_string(), "feature:2");
    }

    #[test]
    fn test_edit_serializes_with_op_tag() {
        let edit = PlanEdit::RemoveItem {
            list: ListField::FeatureItems(1),
            index: 0,
        };
        let value = serde_json::to_value(&edit).unwrap();
        assert_eq!(value["op"], "remove-item");
        assert_eq!(value["list"]["list"], "feature-items");
        assert_eq!(value["list"]["index"], 1);

        let back: PlanEdit = serde_json::from_value(value).unwrap();
        assert_eq!(back, edit);
    }
}
