//! Single-feature markdown export.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{Feature, Subtask};

/// Renders a feature as a standalone markdown document.
pub fn render_feature_markdown(
    feature: &Feature,
    project_name: &str,
    subtasks: &[Subtask],
    exported_at: DateTime<Utc>,
) -> String {
    let mut md = format!(
        "# {}\n\n**Project:** {}\n**Status:** {}\n**Priority:** {}\n",
        feature.title,
        project_name,
        feature.status.as_str().replace('_', " "),
        feature.priority.as_str()
    );
    if let Some(branch) = feature.branch_url.as_deref().filter(|b| !b.is_empty()) {
        md.push_str(&format!("\n**Branch:** [{0}]({0})\n", branch));
    }
    if let Some(pr) = feature.pr_url.as_deref().filter(|p| !p.is_empty()) {
        md.push_str(&format!("\n**Pull request:** [{0}]({0})\n", pr));
    }
    if let Some(description) = feature.description.as_deref().filter(|d| !d.is_empty()) {
        md.push_str(&format!("\n> {}\n", description));
    }

    md.push_str("\n---\n");
    match feature.spec.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(spec) => md.push_str(&format!("\n{}\n", spec)),
        None => md.push_str("\n_No specification written yet._\n"),
    }

    if !subtasks.is_empty() {
        md.push_str("\n## Subtasks\n\n");
        for subtask in subtasks {
            let mark = if subtask.status.is_done() { "x" } else { " " };
            md.push_str(&format!("- [{}] {}\n", mark, subtask.title));
        }
    }

    md.push_str(&format!(
        "\n---\n_Exported from PM Board · {}_\n",
        exported_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    md
}

/// Lower-case ASCII slug used as the download file name. Falls back to
/// `feature` when the title has no alphanumeric characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "feature".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use uuid::Uuid;

    fn feature() -> Feature {
        let ts = Utc::now();
        Feature {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            milestone_id: None,
            title: "Login Page".into(),
            description: Some("Let users sign in".into()),
            spec: None,
            priority: Priority::High,
            status: FeatureStatus::InProgress,
            position: 0,
            branch_url: None,
            pr_url: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slugify("Login Page"), "login-page");
        assert_eq!(slugify("  OAuth 2.0 / SSO!  "), "oauth-2-0-sso");
        assert_eq!(slugify("???"), "feature");
    }

    #[test]
    fn export_without_spec_uses_placeholder() {
        let md = render_feature_markdown(&feature(), "Website", &[], Utc::now());

        assert!(md.starts_with("# Login Page\n\n**Project:** Website\n**Status:** IN PROGRESS\n**Priority:** HIGH\n"));
        assert!(md.contains("> Let users sign in"));
        assert!(md.contains("_No specification written yet._"));
        assert!(!md.contains("## Subtasks"));
    }

    #[test]
    fn export_lists_subtasks_as_checklist() {
        let f = feature();
        let ts = Utc::now();
        let subtasks: Vec<Subtask> = [("form", SubtaskStatus::Done), ("session", SubtaskStatus::Open)]
            .into_iter()
            .enumerate()
            .map(|(i, (title, status))| Subtask {
                id: Uuid::new_v4(),
                feature_id: f.id,
                title: title.into(),
                status,
                position: i as i64,
                created_at: ts,
                updated_at: ts,
            })
            .collect();

        let md = render_feature_markdown(&f, "Website", &subtasks, ts);
        assert!(md.contains("## Subtasks\n\n- [x] form\n- [ ] session\n"));
        assert!(md.contains("_Exported from PM Board · "));
    }
}
