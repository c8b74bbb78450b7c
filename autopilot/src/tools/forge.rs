//! Tools backed by the source-control forge.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::io::forge::{PullRequestDraft, SourceControl};
use crate::tools::{Tool, ToolArgs, arg_str, arg_str_or};

pub(crate) fn forge_tool(name: &str, forge: &Arc<dyn SourceControl>) -> Option<Arc<dyn Tool>> {
    let forge = Arc::clone(forge);
    let tool: Arc<dyn Tool> = match name {
        "create_branch" => Arc::new(move |args: &ToolArgs| create_branch(forge.as_ref(), args)),
        "create_pull_request" => Arc::new(move |args: &ToolArgs| create_pull_request(forge.as_ref(), args)),
        "list_open_issues" => Arc::new(move |_: &ToolArgs| list_open_issues(forge.as_ref())),
        _ => return None,
    };
    Some(tool)
}

fn create_branch(forge: &dyn SourceControl, args: &ToolArgs) -> Result<Value> {
    let branch = arg_str(args, "branch_name")?;
    let base = arg_str_or(args, "base_branch", "main")?;
    forge.create_branch(branch, base)?;
    Ok(Value::String(format!("Created branch {branch} from {base}")))
}

fn create_pull_request(forge: &dyn SourceControl, args: &ToolArgs) -> Result<Value> {
    let draft = PullRequestDraft {
        title: arg_str(args, "title")?.to_string(),
        body: arg_str_or(args, "body", "")?.to_string(),
        head: arg_str(args, "head_branch")?.to_string(),
        base: arg_str_or(args, "base_branch", "main")?.to_string(),
    };
    let pr = forge.create_pull_request(&draft)?;
    Ok(Value::String(format!("Created pull request #{}: {}", pr.number, pr.title)))
}

fn list_open_issues(forge: &dyn SourceControl) -> Result<Value> {
    Ok(Value::Array(
        forge
            .open_issues()?
            .into_iter()
            .map(|issue| Value::String(format!("#{}: {}", issue.number, issue.title)))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeForge;
    use serde_json::json;

    fn args(value: Value) -> ToolArgs {
        serde_json::from_value(value).expect("args")
    }

    #[test]
    fn create_branch_defaults_base_to_main() {
        let fake = Arc::new(FakeForge::default());
        let forge: Arc<dyn SourceControl> = fake.clone();
        let tool = forge_tool("create_branch", &forge).expect("tool");
        let out = tool.call(&args(json!({"branch_name": "feat/x"}))).expect("call");
        assert_eq!(out, json!("Created branch feat/x from main"));
        assert_eq!(fake.branches(), vec![("feat/x".to_string(), "main".to_string())]);
    }

    #[test]
    fn create_pull_request_reports_number() {
        let fake = Arc::new(FakeForge::default());
        let forge: Arc<dyn SourceControl> = fake.clone();
        let tool = forge_tool("create_pull_request", &forge).expect("tool");
        let out = tool
            .call(&args(json!({"title": "Add parser", "body": "b", "head_branch": "feat/x"})))
            .expect("call");
        assert_eq!(out, json!("Created pull request #1: Add parser"));
        assert_eq!(fake.pull_requests()[0].base, "main");
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        let forge: Arc<dyn SourceControl> = Arc::new(FakeForge::default());
        let tool = forge_tool("create_pull_request", &forge).expect("tool");
        assert!(tool.call(&args(json!({"title": "t"}))).is_err());
    }
}
