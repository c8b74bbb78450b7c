//! Repository file tools.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use walkdir::WalkDir;

use crate::tools::{Tool, ToolArgs, arg_str, arg_str_or, path_in_root};

/// Directories never listed by `list_files`.
const SKIPPED_DIRS: [&str; 3] = [".git", "target", "node_modules"];

pub(crate) fn file_tool(name: &str, root: &Path) -> Option<Arc<dyn Tool>> {
    let root = root.to_path_buf();
    let tool: Arc<dyn Tool> = match name {
        "read_file" => Arc::new(move |args: &ToolArgs| read_file(&root, args)),
        "write_file" => Arc::new(move |args: &ToolArgs| write_file(&root, args)),
        "edit_file" => Arc::new(move |args: &ToolArgs| edit_file(&root, args)),
        "list_files" => Arc::new(move |args: &ToolArgs| list_files(&root, args)),
        _ => return None,
    };
    Some(tool)
}

fn read_file(root: &Path, args: &ToolArgs) -> Result<Value> {
    let relative = arg_str(args, "path")?;
    let path = path_in_root(root, relative)?;
    let contents = fs::read_to_string(&path).with_context(|| format!("read {relative}"))?;
    Ok(Value::String(contents))
}

fn write_file(root: &Path, args: &ToolArgs) -> Result<Value> {
    let relative = arg_str(args, "path")?;
    let contents = arg_str(args, "content")?;
    let path = path_in_root(root, relative)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory for {relative}"))?;
    }
    fs::write(&path, contents).with_context(|| format!("write {relative}"))?;
    Ok(Value::String(format!("Successfully wrote {relative}")))
}

/// Replace every occurrence of `search`. A missing search string is reported
/// back to the model as a result, not raised as an error.
fn edit_file(root: &Path, args: &ToolArgs) -> Result<Value> {
    let relative = arg_str(args, "path")?;
    let search = arg_str(args, "search")?;
    let replace = arg_str(args, "replace")?;
    let path = path_in_root(root, relative)?;
    let contents = fs::read_to_string(&path).with_context(|| format!("read {relative}"))?;
    if search.is_empty() || !contents.contains(search) {
        return Ok(Value::String(format!("Error: '{search}' not found in {relative}")));
    }
    fs::write(&path, contents.replace(search, replace)).with_context(|| format!("write {relative}"))?;
    Ok(Value::String(format!("Successfully edited {relative}")))
}

fn list_files(root: &Path, args: &ToolArgs) -> Result<Value> {
    let relative = arg_str_or(args, "directory", ".")?;
    let dir = path_in_root(root, relative)?;
    let mut files: Vec<PathBuf> = Vec::new();
    let walker = WalkDir::new(&dir).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry.depth() > 0
            && SKIPPED_DIRS.iter().any(|skip| entry.file_name() == *skip))
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("list {relative}"))?;
        if entry.file_type().is_file()
            && let Ok(path) = entry.path().strip_prefix(root)
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(Value::Array(
        files
            .into_iter()
            .map(|p| Value::String(p.to_string_lossy().replace('\\', "/")))
            .collect(),
    ))
}
