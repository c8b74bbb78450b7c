//! Autopilot CLI.
//!
//! Runs the development workflow against a repository: reads the roadmap and
//! open forge items, asks the model for the next step, and executes the tool
//! calls it requests until the model is done or a limit is hit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::{Context, Result};
use autopilot::bootstrap::{Project, process_env};
use autopilot::core::workflow::Workflow;
use autopilot::driver::{DriverStop, run_driver};
use autopilot::engine::WorkflowEngine;
use autopilot::exit_codes;
use autopilot::logging;
use autopilot::runtime::RunFlags;
use autopilot::supervisor::{RunMode, RunRequest, RunSupervisor};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "autopilot", version, about = "AI-driven development workflow runner")]
struct Cli {
    /// Config file (default: `<root>/autopilot.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Project root (default: current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workflow against the repository.
    Run(RunArgs),
    /// Check a workflow against the schema and the registered plugins.
    Validate {
        /// Workflow document (default: configured or embedded workflow).
        #[arg(long)]
        workflow: Option<PathBuf>,
    },
    /// List registered node types.
    Plugins,
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Skip tools that modify the repository.
    #[arg(long)]
    dry_run: bool,
    /// Run tools without asking for confirmation.
    #[arg(long)]
    yolo: bool,
    /// Stop after a single iteration.
    #[arg(long)]
    once: bool,
    /// Use the built-in iteration driver instead of interpreting the workflow.
    #[arg(long)]
    direct: bool,
    /// Workflow document (default: configured or embedded workflow).
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Repeat the whole run up to N times.
    #[arg(long, value_name = "N")]
    iterations: Option<u32>,
    /// Do not start another pass once the roadmap's MVP section is complete.
    #[arg(long)]
    stop_at_mvp: bool,
}

impl RunArgs {
    fn flags(&self) -> RunFlags {
        RunFlags {
            dry_run: self.dry_run,
            yolo: self.yolo,
            once: self.once,
        }
    }

    /// Flags for one supervised pass. Repeated passes are single-shot each.
    fn pass_flags(&self) -> RunFlags {
        let mut flags = self.flags();
        if let RunMode::Iterations(n) = self.mode()
            && n > 1
        {
            flags.once = true;
        }
        flags
    }

    fn mode(&self) -> RunMode {
        match (self.once, self.iterations) {
            (true, _) => RunMode::Once,
            (false, Some(n)) => RunMode::Iterations(n),
            (false, None) => RunMode::Continuous,
        }
    }
}

fn main() {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        eprintln!("failed to load .env: {err}");
    }
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let project = Project::load(&root, cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => cmd_run(project, args),
        Command::Validate { workflow } => cmd_validate(&project, workflow.as_deref()),
        Command::Plugins => cmd_plugins(&project),
    }
}

fn cmd_run(project: Project, args: RunArgs) -> Result<i32> {
    let document = project.workflow_document(args.workflow.as_deref())?;
    let engine = WorkflowEngine::new(project.registry());
    let request = RunRequest {
        mode: args.mode(),
        yolo: args.yolo,
        stop_at_mvp: args.stop_at_mvp,
        roadmap_path: project.roadmap_path(),
    };

    let exit = Arc::new(AtomicI32::new(exit_codes::OK));
    let pass_exit = Arc::clone(&exit);
    let supervisor = RunSupervisor::new();
    let Some(handle) = supervisor.start(request, move |_| {
        let code = run_pass(&project, &engine, &document, &args);
        match code {
            Ok(code) => {
                pass_exit.store(code, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                pass_exit.store(exit_codes::INVALID, Ordering::SeqCst);
                Err(err)
            }
        }
    }) else {
        warn!("another run is active");
        return Ok(exit_codes::BUSY);
    };
    if handle.join().is_err() {
        error!("run thread panicked");
        return Ok(exit_codes::INVALID);
    }
    Ok(exit.load(Ordering::SeqCst))
}

/// One pass: fresh runtime, then the driver or the workflow engine.
fn run_pass(project: &Project, engine: &WorkflowEngine, document: &Value, args: &RunArgs) -> Result<i32> {
    let mut runtime = project.build_runtime(args.pass_flags(), &process_env)?;
    if args.direct {
        let outcome = run_driver(&mut runtime, project.config.max_iterations)?;
        info!(passes = outcome.passes, stop = ?outcome.stop, "run finished");
        return Ok(match outcome.stop {
            DriverStop::MaxIterations => exit_codes::LIMIT,
            DriverStop::Completed | DriverStop::Once | DriverStop::MvpReached => exit_codes::OK,
        });
    }
    let report = engine.execute(document, &mut runtime)?;
    Ok(if report.exhausted_loops > 0 {
        exit_codes::LIMIT
    } else {
        exit_codes::OK
    })
}

fn cmd_validate(project: &Project, workflow: Option<&Path>) -> Result<i32> {
    let document = project.workflow_document(workflow)?;
    let parsed = Workflow::from_value(&document)?;
    let engine = WorkflowEngine::new(project.registry());
    let issues = engine.check(&parsed);
    if !issues.is_empty() {
        eprintln!("workflow check failed:\n- {}", issues.join("\n- "));
        return Ok(exit_codes::INVALID);
    }
    println!(
        "ok: {} ({} top-level nodes)",
        parsed.name.as_deref().unwrap_or("workflow"),
        parsed.nodes.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_plugins(project: &Project) -> Result<i32> {
    for node_type in project.registry().node_types() {
        println!("{node_type}");
    }
    Ok(exit_codes::OK)
}
