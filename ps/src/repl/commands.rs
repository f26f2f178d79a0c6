//! Parsing of the REPL's edit commands into plan edits
//!
//! Positions typed by the user are 1-based, matching the numbered outline the
//! REPL prints. They are converted to 0-based indices here.

use crate::session::{EditError, ListField, PlanEdit, Section};

/// Turn `/set`, `/add`, `/update`, `/rm`, `/move`, `/section` and `/unsection`
/// arguments into a [`PlanEdit`]
pub fn parse_edit_command(cmd: &str, args: &str) -> Result<PlanEdit, String> {
    match cmd {
        "/set" => parse_set(args),
        "/add" => Ok(PlanEdit::AppendItem {
            list: parse_list(required(args, "list")?)?,
        }),
        "/update" => {
            let (list, rest) = split_word(args);
            let (position, value) = split_word(rest);
            Ok(PlanEdit::UpdateItem {
                list: parse_list(required(list, "list")?)?,
                index: parse_position(position)?,
                value: value.to_string(),
            })
        }
        "/rm" => {
            let (list, rest) = split_word(args);
            Ok(PlanEdit::RemoveItem {
                list: parse_list(required(list, "list")?)?,
                index: parse_position(rest)?,
            })
        }
        "/move" => {
            let (list, rest) = split_word(args);
            let (from, to) = split_word(rest);
            Ok(PlanEdit::MoveItem {
                list: parse_list(required(list, "list")?)?,
                from: parse_position(from)?,
                to: parse_position(to)?,
            })
        }
        "/section" => Ok(PlanEdit::AddSection {
            section: parse_section(required(args, "section")?)?,
        }),
        "/unsection" => {
            let (section, rest) = split_word(args);
            Ok(PlanEdit::RemoveSection {
                section: parse_section(required(section, "section")?)?,
                index: parse_position(rest)?,
            })
        }
        _ => Err(format!("Not an edit command: {}", cmd)),
    }
}

fn parse_set(args: &str) -> Result<PlanEdit, String> {
    let (field, rest) = split_word(args);
    match field {
        "title" => Ok(PlanEdit::SetTitle { value: rest.to_string() }),
        "summary" => Ok(PlanEdit::SetSummary { value: rest.to_string() }),
        "feature" | "task" | "risk" | "mitigation" => {
            let (position, value) = split_word(rest);
            let index = parse_position(position)?;
            let value = value.to_string();
            Ok(match field {
                "feature" => PlanEdit::SetFeatureCategory { index, value },
                "task" => PlanEdit::SetTaskPhaseName { index, value },
                "risk" => PlanEdit::SetRisk { index, value },
                _ => PlanEdit::SetRiskMitigation { index, value },
            })
        }
        "milestone" => {
            let (position, rest) = split_word(rest);
            let index = parse_position(position)?;
            let (part, value) = split_word(rest);
            let value = value.to_string();
            match part {
                "name" => Ok(PlanEdit::SetMilestoneName { index, value }),
                "deadline" => Ok(PlanEdit::SetMilestoneDeadline { index, value }),
                "description" | "desc" => Ok(PlanEdit::SetMilestoneDescription { index, value }),
                _ => Err("Usage: /set milestone <n> name|deadline|description <text>".to_string()),
            }
        }
        "" => Err("Usage: /set <field> ...".to_string()),
        other => Err(format!("Unknown field: {}", other)),
    }
}

fn parse_list(arg: &str) -> Result<ListField, String> {
    let field: ListField = arg.parse().map_err(|e: EditError| e.to_string())?;
    Ok(match field {
        ListField::FeatureItems(n) => ListField::FeatureItems(from_display(n)?),
        ListField::TaskItems(n) => ListField::TaskItems(from_display(n)?),
        other => other,
    })
}

fn parse_section(arg: &str) -> Result<Section, String> {
    arg.parse().map_err(|e: EditError| e.to_string())
}

fn parse_position(arg: &str) -> Result<usize, String> {
    let n: usize = arg
        .trim()
        .parse()
        .map_err(|_| format!("Expected a position number, got '{}'", arg.trim()))?;
    from_display(n)
}

fn from_display(n: usize) -> Result<usize, String> {
    n.checked_sub(1).ok_or_else(|| "Positions start at 1".to_string())
}

fn required<'a>(arg: &'a str, what: &str) -> Result<&'a str, String> {
    if arg.trim().is_empty() {
        return Err(format!("Missing {}", what));
    }
    Ok(arg.trim())
}

/// Split off the first whitespace-delimited word
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}
