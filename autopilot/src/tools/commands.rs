//! Command-backed tools: tests, lint and docker tasks.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::info;

use crate::io::process::{ProcessLimits, run_command_with_timeout};
use crate::tools::{Tool, ToolArgs, ToolSettings, arg_str, arg_str_or, path_in_root};

/// Runs a fixed argv in a working directory chosen by the `path` argument.
struct ProjectCommand {
    label: &'static str,
    argv: Vec<String>,
    root: PathBuf,
    limits: ProcessLimits,
}

impl Tool for ProjectCommand {
    fn call(&self, args: &ToolArgs) -> Result<Value> {
        let (program, rest) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("{} command is empty", self.label))?;
        let relative = arg_str_or(args, "path", ".")?;
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(path_in_root(&self.root, relative)?);
        info!(tool = self.label, command = ?self.argv, path = relative, "running project command");
        let output = run_command_with_timeout(cmd, None, self.limits)?;
        Ok(Value::String(output.render()))
    }
}

/// `docker run --rm` with the repository mounted at `/workspace`.
struct DockerTask {
    root: PathBuf,
    limits: ProcessLimits,
}

impl DockerTask {
    fn command(&self, image: &str, script: &str, workdir: &str) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/workspace", self.root.display()))
            .arg("-w")
            .arg(workdir)
            .arg(image)
            .arg("sh")
            .arg("-c")
            .arg(script);
        cmd
    }
}

impl Tool for DockerTask {
    fn call(&self, args: &ToolArgs) -> Result<Value> {
        let image = arg_str(args, "image")?;
        let script = arg_str(args, "command")?;
        let workdir = arg_str_or(args, "workdir", "/workspace")?;
        info!(image, workdir, "running docker task");
        let output = run_command_with_timeout(self.command(image, script, workdir), None, self.limits)?;
        Ok(Value::String(output.render()))
    }
}

pub(crate) fn command_tool(name: &str, settings: &ToolSettings) -> Option<Arc<dyn Tool>> {
    let project = |label: &'static str, argv: &[String]| -> Arc<dyn Tool> {
        Arc::new(ProjectCommand {
            label,
            argv: argv.to_vec(),
            root: settings.root.clone(),
            limits: settings.limits,
        })
    };
    match name {
        "run_tests" => Some(project("run_tests", &settings.commands.test)),
        "run_lint" => Some(project("run_lint", &settings.commands.lint)),
        "run_docker_task" => Some(Arc::new(DockerTask {
            root: absolute(&settings.root),
            limits: settings.limits,
        })),
        _ => None,
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
