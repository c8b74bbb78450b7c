//! SDLC context handed to the model: roadmap plus open issues and PRs.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::{debug, error, instrument};

use crate::io::forge::{IssueSummary, SourceControl};
use crate::io::roadmap::read_roadmap;
use crate::io::translations::Translations;

const CONTEXT_TEMPLATE: &str = include_str!("../../assets/sdlc_context.md.j2");

/// Issues and PRs listed per category.
pub const FORGE_ITEM_LIMIT: usize = 5;

/// Render the SDLC context.
///
/// Forge failures are logged and the context is rendered without that list.
/// A missing roadmap renders the "create it" request instead.
#[instrument(skip_all, fields(roadmap = %roadmap_path.display(), forge = forge.is_some()))]
pub fn build_sdlc_context(
    roadmap_path: &Path,
    forge: Option<&dyn SourceControl>,
    texts: &Translations,
) -> Result<String> {
    let roadmap = read_roadmap(roadmap_path)?;

    let (issues, pulls) = match forge {
        Some(forge) => (
            forge_items(forge.open_issues(), "open issues"),
            forge_items(forge.open_pull_requests(), "open pull requests"),
        ),
        None => (Vec::new(), Vec::new()),
    };
    debug!(issues = issues.len(), pulls = pulls.len(), "collected forge items");

    let mut env = Environment::new();
    env.add_template("sdlc_context", CONTEXT_TEMPLATE)
        .context("load sdlc context template")?;
    let rendered = env
        .get_template("sdlc_context")
        .context("get sdlc context template")?
        .render(context! {
            roadmap => roadmap,
            roadmap_label => texts.get("roadmap_label"),
            missing_roadmap_msg => texts.get("missing_roadmap_msg"),
            open_issues_label => texts.get("open_issues_label"),
            open_prs_label => texts.get("open_prs_label"),
            issues => issues,
            pulls => pulls,
        })
        .context("render sdlc context")?;
    Ok(rendered.trim().to_string())
}

fn forge_items(result: Result<Vec<IssueSummary>>, what: &str) -> Vec<IssueSummary> {
    match result {
        Ok(mut items) => {
            items.truncate(FORGE_ITEM_LIMIT);
            items
        }
        Err(err) => {
            error!(err = %format!("{err:#}"), "failed to fetch {what} for sdlc context");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeForge;
    use std::fs;

    #[test]
    fn missing_roadmap_asks_for_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let text = build_sdlc_context(&temp.path().join("ROADMAP.md"), None, &Translations::default())
            .expect("context");
        assert_eq!(
            text,
            "ROADMAP.md is missing. Please analyze the repository and create it."
        );
    }

    #[test]
    fn lists_at_most_five_issues_and_prs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ROADMAP.md");
        fs::write(&path, "## v1 (MVP)\n- [ ] parser").expect("write");
        let forge = FakeForge::with_issues((1..=7).map(|n| (n, format!("issue {n}"))).collect());
        forge.set_pulls(vec![(10, "Add CLI".to_string())]);

        let text = build_sdlc_context(&path, Some(&forge), &Translations::default()).expect("context");
        assert!(text.starts_with("ROADMAP.md Content:\n## v1 (MVP)\n- [ ] parser"), "{text}");
        assert!(text.contains("Open Issues:\n- #1: issue 1\n"), "{text}");
        assert!(text.contains("- #5: issue 5"));
        assert!(!text.contains("issue 6"));
        assert!(text.contains("Open Pull Requests:\n- #10: Add CLI"));
    }

    #[test]
    fn forge_failure_is_not_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ROADMAP.md");
        fs::write(&path, "plan").expect("write");
        let forge = FakeForge::failing("rate limited");
        let text = build_sdlc_context(&path, Some(&forge), &Translations::default()).expect("context");
        assert_eq!(text, "ROADMAP.md Content:\nplan");
    }
}
