//! The project context snapshot handed to coding agents.
//!
//! A snapshot bundles a project with its features, milestones and recent
//! activity. It renders either as JSON or as a markdown document that also
//! explains the expected agent workflow, with ready-to-run `curl` commands
//! pointing at the configured public URL.

use std::fmt;

use anyhow::{Context as _, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::dedupe::dedupe_changelog;
use crate::models::*;

/// Raw entries read before deduplication.
pub const RECENT_FETCH_LIMIT: u32 = 20;
/// Entries shown after deduplication.
pub const RECENT_ACTIVITY_LIMIT: usize = 5;

/// File name agents are told to save the snapshot under.
pub const CONTEXT_FILE_NAME: &str = ".pm-board-context.md";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureWithSubtasks {
    #[serde(flatten)]
    pub feature: Feature,
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(flatten)]
    pub project: Project,
    /// Ordered by status column, then position.
    pub features: Vec<FeatureWithSubtasks>,
    pub milestones: Vec<Milestone>,
    pub recent_activity: Vec<ChangeLogEntry>,
}

impl ContextSnapshot {
    /// Builds a snapshot from independently loaded parts. `recent` must be
    /// newest first; it is deduplicated and cut to [`RECENT_ACTIVITY_LIMIT`].
    pub fn assemble(
        project: Project,
        features: Vec<(Feature, Vec<Subtask>)>,
        milestones: Vec<Milestone>,
        recent: Vec<ChangeLogEntry>,
    ) -> Self {
        let mut recent_activity = dedupe_changelog(recent);
        recent_activity.truncate(RECENT_ACTIVITY_LIMIT);

        Self {
            project,
            features: features
                .into_iter()
                .map(|(feature, subtasks)| FeatureWithSubtasks { feature, subtasks })
                .collect(),
            milestones,
            recent_activity,
        }
    }

    /// Loads a snapshot with sequential reads. Returns `None` when the
    /// project does not exist.
    pub fn load(db: &Database, project_id: Uuid) -> Result<Option<Self>> {
        let Some(project) = db.get_project(project_id)? else {
            return Ok(None);
        };
        let features = db
            .list_project_features_with_subtasks(project_id)
            .context("Failed to load features for context")?;
        let milestones = db.list_milestones(project_id)?;
        let recent = db.recent_changes(project_id, RECENT_FETCH_LIMIT)?;
        Ok(Some(Self::assemble(project, features, milestones, recent)))
    }

    fn count(&self, status: FeatureStatus) -> usize {
        self.features
            .iter()
            .filter(|f| f.feature.status == status)
            .count()
    }

    /// Renders the markdown document. `base_url` is the public address of
    /// the server, without a trailing slash.
    pub fn render_markdown(&self, base_url: &str, generated_at: DateTime<Utc>) -> String {
        MarkdownView {
            snapshot: self,
            base_url: base_url.trim_end_matches('/'),
            generated: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
        .to_string()
    }
}

/// Markdown rendering of a snapshot, written through `Display`.
struct MarkdownView<'a> {
    snapshot: &'a ContextSnapshot,
    base_url: &'a str,
    generated: String,
}

impl fmt::Display for MarkdownView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let project = &self.snapshot.project;
        let context_url = format!("{}/api/agent/projects/{}/context", self.base_url, project.id);

        writeln!(f, "# Project Context: {}\n", project.name)?;
        writeln!(
            f,
            "> **This is a live snapshot.** Re-fetch at any time to get the latest state."
        )?;
        writeln!(f, "> ```")?;
        writeln!(f, "> curl -s \"{}\" > {}", context_url, CONTEXT_FILE_NAME)?;
        writeln!(f, "> ```\n")?;

        writeln!(f, "## Project\n")?;
        writeln!(f, "- **Name:** {}", project.name)?;
        writeln!(f, "- **ID:** `{}`", project.id)?;
        if let Some(description) = project.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(f, "- **Description:** {}", description)?;
        }
        if let Some(repo_url) = project.repo_url.as_deref().filter(|u| !u.is_empty()) {
            writeln!(f, "- **Repository:** {}", repo_url)?;
        }
        writeln!(f, "- **Generated:** {}\n", self.generated)?;

        writeln!(f, "## Mission / Context\n")?;
        match project.context_md.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(context) => writeln!(f, "{}\n", context.trim_end())?,
            None => writeln!(
                f,
                "_No project mission/context markdown yet. Add it in Project Settings or via API (`context_md`)._\n"
            )?,
        }

        self.write_summary(f)?;
        self.write_milestones(f)?;
        self.write_features(f)?;
        writeln!(f, "---\n")?;
        self.write_activity(f)?;
        writeln!(f, "---\n")?;
        write_agent_instructions(f, self.base_url, project.id, &context_url)?;

        writeln!(f, "_Generated by PM Board · {}_", self.generated)
    }
}

impl MarkdownView<'_> {
    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot;
        writeln!(f, "## Summary\n")?;
        writeln!(f, "| Status | Count |")?;
        writeln!(f, "|---|---|")?;
        writeln!(f, "| In Progress | {} |", snapshot.count(FeatureStatus::InProgress))?;
        writeln!(
            f,
            "| Todo / Backlog | {} |",
            snapshot.count(FeatureStatus::Todo) + snapshot.count(FeatureStatus::Backlog)
        )?;
        writeln!(f, "| Done | {} |", snapshot.count(FeatureStatus::Done))?;
        writeln!(f, "| **Total** | **{}** |\n", snapshot.features.len())
    }

    fn write_milestones(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot;
        writeln!(f, "## Milestones\n")?;
        if snapshot.milestones.is_empty() {
            return writeln!(f, "_No milestones yet. Create them via the Roadmap view or API._\n");
        }

        let sections: Vec<String> = snapshot
            .milestones
            .iter()
            .map(|milestone| {
                let features: Vec<&Feature> = snapshot
                    .features
                    .iter()
                    .map(|f| &f.feature)
                    .filter(|f| f.milestone_id == Some(milestone.id))
                    .collect();

                let date = milestone
                    .target_date
                    .map(|d| format!(" · {}", d.format("%Y-%m-%d")))
                    .unwrap_or_default();
                let counts = match features.len() {
                    0 => " (empty)".to_string(),
                    1 => " (1 feature)".to_string(),
                    n => format!(" ({} features)", n),
                };
                let list = if features.is_empty() {
                    "  _No features assigned_".to_string()
                } else {
                    features
                        .iter()
                        .map(|f| format!("  - [{}] {} · `{}`", f.status.as_str(), f.title, f.id))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                format!("### {}{}{}\n`{}`\n{}", milestone.name, date, counts, milestone.id, list)
            })
            .collect();
        writeln!(f, "{}\n", sections.join("\n\n"))
    }

    fn write_features(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot;
        writeln!(f, "## Features\n")?;

        let sections: Vec<String> = FeatureStatus::DISPLAY_ORDER
            .iter()
            .filter_map(|status| {
                let group: Vec<&FeatureWithSubtasks> = snapshot
                    .features
                    .iter()
                    .filter(|f| f.feature.status == *status)
                    .collect();
                if group.is_empty() {
                    return None;
                }
                let items = group
                    .iter()
                    .map(|f| render_feature(f))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Some(format!("### {} ({})\n\n{}", status.label(), group.len(), items))
            })
            .collect();

        if sections.is_empty() {
            writeln!(f, "_No features yet._\n")
        } else {
            writeln!(f, "{}\n", sections.join("\n\n---\n\n"))
        }
    }

    fn write_activity(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Recent activity\n")?;
        if self.snapshot.recent_activity.is_empty() {
            return writeln!(f, "_No activity recorded yet._\n");
        }
        for entry in &self.snapshot.recent_activity {
            let link = entry
                .feature_id
                .map(|id| format!(" · feature `{}`", id))
                .unwrap_or_default();
            writeln!(
                f,
                "- `{}` {}{}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.summary,
                link
            )?;
        }
        writeln!(f)
    }
}

fn render_feature(f: &FeatureWithSubtasks) -> String {
    let feature = &f.feature;
    let mut out = format!(
        "#### {}\n- Priority: {}\n- ID: `{}`",
        feature.title,
        feature.priority.as_str(),
        feature.id
    );
    if let Some(branch) = feature.branch_url.as_deref().filter(|b| !b.is_empty()) {
        out.push_str(&format!("\n  Branch: {}", branch));
    }
    if let Some(pr) = feature.pr_url.as_deref().filter(|p| !p.is_empty()) {
        out.push_str(&format!("\n  PR: {}", pr));
    }
    for subtask in &f.subtasks {
        let mark = if subtask.status.is_done() { "x" } else { " " };
        out.push_str(&format!("\n  - [{}] {}", mark, subtask.title));
    }
    if let Some(spec) = feature.spec.as_deref().filter(|s| !s.is_empty()) {
        let indented = spec
            .lines()
            .map(|line| format!("  {}", line))
            .collect::<Vec<_>>()
            .join("\n");
        out.push_str(&format!("\n\n  **Spec:**\n{}", indented));
    }
    out
}

fn write_agent_instructions(
    f: &mut fmt::Formatter<'_>,
    base_url: &str,
    project_id: Uuid,
    context_url: &str,
) -> fmt::Result {
    let feature_url = format!("{}/api/agent/features/<featureId>", base_url);
    let patch = |body: &str| {
        format!(
            "```bash\ncurl -X PATCH {} \\\n  -H \"Content-Type: application/json\" \\\n  -d '{}'\n```",
            feature_url, body
        )
    };

    writeln!(f, "## Agent instructions\n")?;
    writeln!(f, "### Coding workflow (follow this for every feature)\n")?;
    writeln!(f, "1. Pick the next `todo` or `backlog` feature from this document.")?;
    writeln!(f, "2. Create a branch named after the feature: `feat/<short-slug>`")?;
    writeln!(
        f,
        "3. Move the feature to `in_progress` and record the branch URL:\n{}",
        patch(r#"{"status": "in_progress", "branch_url": "https://github.com/org/repo/tree/feat/<slug>"}"#)
    )?;
    writeln!(
        f,
        "4. Implement the feature. Mark subtasks done as you complete them:\n{}",
        patch(r#"{"subtasks": [{"id": "<subtaskId>", "status": "done"}]}"#)
    )?;
    writeln!(
        f,
        "5. Open a pull request against `main`. Record the PR URL and move the feature to `in_review`:\n{}",
        patch(r#"{"status": "in_review", "pr_url": "https://github.com/org/repo/pull/<number>"}"#)
    )?;
    writeln!(
        f,
        "6. **Stop and wait for human review.** Do not merge. Do not start the next feature until the human approves or requests changes."
    )?;
    writeln!(
        f,
        "7. Once merged, mark the feature done:\n{}\n",
        patch(r#"{"status": "done"}"#)
    )?;

    writeln!(f, "### Other useful commands\n")?;
    writeln!(
        f,
        "**Refresh context** (do this at session start and after any update):\n```bash\ncurl -s \"{}\"\n```\n",
        context_url
    )?;
    writeln!(
        f,
        "**Create a new feature (optionally assign to a milestone):**\n```bash\ncurl -X POST {}/api/agent/features \\\n  -H \"Content-Type: application/json\" \\\n  -d '{{\"project_id\": \"{}\", \"title\": \"...\", \"priority\": \"medium\", \"status\": \"backlog\", \"milestone_id\": \"<milestoneId>\"}}'\n```\n",
        base_url, project_id
    )?;
    writeln!(
        f,
        "**Create a milestone:**\n```bash\ncurl -X POST {}/api/agent/projects/{}/milestones \\\n  -H \"Content-Type: application/json\" \\\n  -d '{{\"name\": \"v1.0\", \"description\": \"Initial release\"}}'\n```\n",
        base_url, project_id
    )?;
    writeln!(
        f,
        "After any update, re-fetch this document to confirm the change is reflected.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn project() -> Project {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        Project {
            id: Uuid::new_v4(),
            name: "Website".into(),
            description: Some("Marketing site".into()),
            repo_url: None,
            context_md: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn feature(project: &Project, title: &str, status: FeatureStatus, position: i64) -> Feature {
        Feature {
            id: Uuid::new_v4(),
            project_id: project.id,
            milestone_id: None,
            title: title.into(),
            description: None,
            spec: None,
            priority: Priority::Medium,
            status,
            position,
            branch_url: None,
            pr_url: None,
            created_at: project.created_at,
            updated_at: project.created_at,
        }
    }

    fn entry(project: &Project, summary: &str, at: DateTime<Utc>) -> ChangeLogEntry {
        ChangeLogEntry {
            id: Uuid::new_v4(),
            project_id: project.id,
            action: ChangeAction::SpecUpdated,
            summary: summary.into(),
            feature_id: None,
            feature_title: None,
            subtask_id: None,
            subtask_title: None,
            meta: None,
            source: ChangeSource::Human,
            created_at: at,
        }
    }

    #[test]
    fn empty_project_uses_placeholders() {
        let snapshot = ContextSnapshot::assemble(project(), vec![], vec![], vec![]);
        let md = snapshot.render_markdown("http://localhost:3000", Utc::now());

        assert!(md.starts_with("# Project Context: Website"));
        assert!(md.contains("_No project mission/context markdown yet."));
        assert!(md.contains("_No milestones yet."));
        assert!(md.contains("_No features yet._"));
        assert!(md.contains("_No activity recorded yet._"));
        assert!(md.contains("| **Total** | **0** |"));
    }

    #[test]
    fn features_are_grouped_in_display_order() {
        let p = project();
        let mut done = feature(&p, "Shipped", FeatureStatus::Done, 0);
        done.spec = Some("line one\nline two".into());
        let active = feature(&p, "Active", FeatureStatus::InProgress, 0);
        let snapshot = ContextSnapshot::assemble(
            p.clone(),
            vec![(done, vec![]), (active, vec![])],
            vec![],
            vec![],
        );
        let md = snapshot.render_markdown("http://localhost:3000", Utc::now());

        let in_progress = md.find("### In Progress (1)").unwrap();
        let done = md.find("### Done (1)").unwrap();
        assert!(in_progress < done);
        assert!(md.contains("  **Spec:**\n  line one\n  line two"));
        assert!(md.contains("| In Progress | 1 |"));
    }

    #[test]
    fn document_sections_are_laid_out_in_order() {
        let p = project();
        let mut active = feature(&p, "Active", FeatureStatus::InProgress, 0);
        active.branch_url = Some("https://git.example.com/tree/feat/active".into());
        let subtask = Subtask {
            id: Uuid::new_v4(),
            feature_id: active.id,
            title: "Write docs".into(),
            status: SubtaskStatus::Done,
            position: 0,
            created_at: p.created_at,
            updated_at: p.created_at,
        };
        let generated_at = Utc.with_ymd_and_hms(2025, 3, 2, 8, 30, 0).unwrap();
        let recent = vec![entry(&p, "Spec updated", generated_at)];
        let snapshot =
            ContextSnapshot::assemble(p.clone(), vec![(active, vec![subtask])], vec![], recent);
        let md = snapshot.render_markdown("http://localhost:3000", generated_at);

        assert!(md.starts_with("# Project Context: Website\n\n> **This is a live snapshot.**"));
        assert!(md.contains("- **Description:** Marketing site\n- **Generated:** 2025-03-02T08:30:00.000Z\n\n## Mission / Context"));
        assert!(md.contains("- ID: `"));
        assert!(md.contains("\n  Branch: https://git.example.com/tree/feat/active\n  - [x] Write docs\n\n---\n\n## Recent activity\n\n- `2025-03-02 08:30` Spec updated\n\n---\n\n## Agent instructions"));
        assert!(md.ends_with("_Generated by PM Board · 2025-03-02T08:30:00.000Z_\n"));
    }

    #[test]
    fn commands_use_configured_base_url() {
        let p = project();
        let snapshot = ContextSnapshot::assemble(p.clone(), vec![], vec![], vec![]);
        let md = snapshot.render_markdown("https://board.example.com/", Utc::now());

        assert!(md.contains(&format!(
            "curl -s \"https://board.example.com/api/agent/projects/{}/context\" > .pm-board-context.md",
            p.id
        )));
        assert!(md.contains("curl -X PATCH https://board.example.com/api/agent/features/<featureId>"));
        assert!(!md.contains("localhost"));
    }

    #[test]
    fn activity_is_deduped_then_capped() {
        let p = project();
        let start = p.created_at;
        let mut recent: Vec<ChangeLogEntry> = (0..8)
            .map(|i| entry(&p, &format!("change {}", i), start + Duration::minutes(i)))
            .collect();
        recent.push(entry(&p, "change 7", start + Duration::minutes(7) - Duration::seconds(1)));
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let snapshot = ContextSnapshot::assemble(p, vec![], vec![], recent);

        assert_eq!(snapshot.recent_activity.len(), RECENT_ACTIVITY_LIMIT);
        let summaries: Vec<&str> = snapshot
            .recent_activity
            .iter()
            .map(|e| e.summary.as_str())
            .collect();
        assert_eq!(
            summaries,
            vec!["change 7", "change 6", "change 5", "change 4", "change 3"]
        );
    }

    #[test]
    fn milestones_list_their_features() {
        let p = project();
        let milestone = Milestone {
            id: Uuid::new_v4(),
            project_id: p.id,
            name: "v1.0".into(),
            description: None,
            target_date: chrono::NaiveDate::from_ymd_opt(2025, 6, 30),
            position: 0,
            created_at: p.created_at,
            updated_at: p.created_at,
        };
        let mut scheduled = feature(&p, "Login", FeatureStatus::Todo, 0);
        scheduled.milestone_id = Some(milestone.id);

        let snapshot = ContextSnapshot::assemble(
            p,
            vec![(scheduled.clone(), vec![])],
            vec![milestone.clone()],
            vec![],
        );
        let md = snapshot.render_markdown("http://localhost:3000", Utc::now());

        assert!(md.contains("### v1.0 · 2025-06-30 (1 feature)"));
        assert!(md.contains(&format!("  - [TODO] Login · `{}`", scheduled.id)));
    }
}
