//! Task command implementations (run a task, list tasks)

use std::path::Path;
use std::process::ExitCode;

use super::{Cli, Commands, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::BuildContext;
use crate::config::{load_project, loader::merge_cli_overrides, CliOverrides};
use crate::tasks::TaskRegistry;

/// Load configuration and run the selected command
pub fn run_cli(cli: &Cli) -> ExitCode {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: cannot determine current directory: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    ExitCode::from(run_in(cli, &cwd))
}

/// Run the selected command as if started from `cwd`, returning the exit code
pub fn run_in(cli: &Cli, cwd: &Path) -> u8 {
    let loaded = match load_project(cli.config.as_deref(), cwd) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return EXIT_ERROR;
        }
    };
    match &loaded.source {
        Some(path) => tracing::info!("Using config: {}", path.display()),
        None => tracing::info!("No assetpipe.toml found, using defaults"),
    }

    let mut config = loaded.config;
    let overrides = CliOverrides {
        out: cli.out.clone(),
        src: cli.src.clone(),
        port: match cli.command {
            Commands::Serve { port } => port,
            _ => None,
        },
    };
    merge_cli_overrides(&mut config, &overrides);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("Error: {}", error);
        }
        return EXIT_INVALID_ARGS;
    }

    let mode = cli.mode();
    tracing::info!("Mode: {}", mode);
    let ctx = BuildContext::new(config, loaded.root, mode);
    let registry = TaskRegistry::standard(&ctx);

    let Some(name) = cli.command.task_name() else {
        return run_list(&registry);
    };
    run_task(&registry, name)
}

/// Print every registered task
fn run_list(registry: &TaskRegistry) -> u8 {
    println!("Tasks:");
    for (name, runs) in registry.describe() {
        if name == runs {
            println!("  {}", name);
        } else {
            println!("  {:<14} {}", name, runs);
        }
    }
    EXIT_SUCCESS
}

/// Run one task on a fresh runtime and report the outcome
fn run_task(registry: &TaskRegistry, name: &str) -> u8 {
    let Some(task) = registry.get(name) else {
        eprintln!("Error: unknown task '{}'", name);
        return EXIT_INVALID_ARGS;
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return EXIT_ERROR;
        }
    };

    match runtime.block_on(task.run()) {
        Ok(report) => {
            println!("{}", report.summary());
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    }
}
