use std::env;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use relpack_builder::{
    build_upgrade_package_with_hooks, plan_upgrade_package, BuildPlan, ErlSystools,
    PackageOutcome, SearchContext, WorkspaceLayout,
};
use relpack_core::{read_reltool_identity, resolve_tree_identity, ReleaseIdentity};
use tracing::debug;

use crate::completion::write_completions_script;
use crate::config::{load_config, resolve_build_settings, PREVIOUS_RELEASE_ENV};
use crate::render::TerminalRenderer;
use crate::{BuildArgs, Cli, Commands};

pub(crate) fn run_cli(cli: Cli, renderer: TerminalRenderer) -> Result<()> {
    match cli.command {
        Commands::Build(args) => run_build_command(&args, renderer),
        Commands::Inspect {
            reltool_config,
            work_dir,
        } => {
            let work_dir = match work_dir {
                Some(dir) => dir,
                None => env::current_dir().context("failed to resolve current directory")?,
            };
            run_inspect_command(&reltool_config, &work_dir, renderer)
        }
        Commands::Completions { shell } => {
            let mut stdout = io::stdout().lock();
            write_completions_script(shell, &mut stdout)
        }
    }
}

fn run_build_command(args: &BuildArgs, renderer: TerminalRenderer) -> Result<()> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let config = load_config(args.config.as_deref(), &cwd)?;
    let settings =
        resolve_build_settings(args, &config, env::var_os(PREVIOUS_RELEASE_ENV), &cwd)?;
    debug!(
        work_dir = %settings.work_dir.display(),
        previous_release = %settings.previous_release.display(),
        erl = %settings.erl.display(),
        "resolved build settings"
    );

    let request = settings.request(&args.reltool_config);
    let mut search = SearchContext::new(settings.code_path.clone());

    if args.dry_run {
        let plan = plan_upgrade_package(&request, &search)
            .context("upgrade package plan failed")?;
        renderer.print_section("upgrade plan");
        renderer.print_lines(&format_plan_lines(&plan));
        return Ok(());
    }

    let differ = ErlSystools::new(&settings.erl);
    let mut progress = renderer.start_progress("build");
    let report = build_upgrade_package_with_hooks(&request, &differ, &mut search, |stage| {
        progress.enter(stage)
    });

    match report.result {
        Ok(outcome) => {
            progress.finish_success();
            for warning in &report.cleanup.warnings {
                renderer.print_status("warn", &warning.to_string());
            }
            renderer.print_status("ok", &format_package_summary(&outcome));
            Ok(())
        }
        Err(err) => {
            progress.finish_abandon();
            for warning in &report.cleanup.warnings {
                renderer.print_status("warn", &warning.to_string());
            }
            Err(anyhow::Error::new(err).context("upgrade package build failed"))
        }
    }
}

fn run_inspect_command(
    reltool_config: &Path,
    work_dir: &Path,
    renderer: TerminalRenderer,
) -> Result<()> {
    let reltool = read_reltool_identity(reltool_config)?;
    let new_tree = WorkspaceLayout::new(work_dir).new_tree(&reltool.name);
    let rel = resolve_tree_identity(new_tree.root(), &reltool.name)?;

    renderer.print_lines(&format_inspect_lines(&reltool, &rel));
    if reltool == rel {
        renderer.print_status("ok", "reltool.config and .rel agree");
    } else {
        renderer.print_status("warn", "reltool.config and .rel disagree");
    }
    Ok(())
}

pub(crate) fn format_package_summary(outcome: &PackageOutcome) -> String {
    format!(
        "built {} ({} -> {}) sha256={}",
        outcome.package.display(),
        outcome.context.old_version(),
        outcome.context.new_version(),
        outcome.sha256
    )
}

pub(crate) fn format_inspect_lines(reltool: &ReleaseIdentity, rel: &ReleaseIdentity) -> Vec<String> {
    vec![format!("reltool: {reltool}"), format!("rel: {rel}")]
}

pub(crate) fn format_plan_lines(plan: &BuildPlan) -> Vec<String> {
    let context = &plan.context;
    let mut lines = vec![
        format!(
            "release: {} {} -> {}",
            context.name(),
            context.old_version(),
            context.new_version()
        ),
        format!("release file: {}", context.name_ver()),
        format!("previous release: {}", plan.resolved.old_tree.root().display()),
        "search path:".to_string(),
    ];
    lines.extend(
        plan.search
            .entries()
            .iter()
            .map(|entry| format!("  {}", entry.display())),
    );
    lines.push("artifacts:".to_string());
    lines.extend(
        plan.artifacts
            .iter()
            .map(|(artifact, path)| format!("  {}: {}", artifact.as_str(), path.display())),
    );
    lines.push(format!("package: {}", plan.package.display()));
    lines
}
