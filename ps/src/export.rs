//! Markdown export of the committed plan

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::domain::StructuredPlan;

/// Filename stem used when the plan has no usable title
const FALLBACK_SLUG: &str = "project-plan";

/// Write `plan` as markdown and return the path written
///
/// `output` may name a file, or a directory that receives a generated
/// `<timestamp>-<slug>.md`. Without it the current directory is used.
pub fn export_plan(plan: &StructuredPlan, output: Option<&Path>) -> Result<PathBuf> {
    debug!(?output, "export_plan: called");
    let path = match output {
        Some(path) if !path.is_dir() => path.to_path_buf(),
        Some(dir) => dir.join(plan_filename(plan)),
        None => PathBuf::from(plan_filename(plan)),
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create export directory")?;
    }
    std::fs::write(&path, plan.to_markdown()).context(format!("Failed to write plan to {}", path.display()))?;

    info!(path = %path.display(), "Exported plan");
    Ok(path)
}

/// `<timestamp>-<slug>.md` for the plan's title
pub fn plan_filename(plan: &StructuredPlan) -> String {
    let slug = match slugify(&plan.title) {
        s if s.is_empty() => FALLBACK_SLUG.to_string(),
        s => s,
    };
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    format!("{}-{}.md", timestamp, slug)
}

/// Slugify a string for use in filenames
pub fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(50)
        .collect()
}
