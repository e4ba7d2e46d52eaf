//! Source checkout: working tree at the triggering commit, with submodules and full history

use crate::core::config::SubmoduleMode;
use crate::core::RunContext;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::stages::{reset_dir, StageError, StageReport};
use tracing::{info, warn};

/// Check out the source tree into `ctx.checkout_dir`
pub async fn run<R: CommandRunner + ?Sized>(
    runner: &R,
    ctx: &RunContext,
) -> Result<StageReport, StageError> {
    let source = &ctx.config.source;
    let dir = &ctx.checkout_dir;
    let branch = ctx.trigger.branch();

    reset_dir(dir)?;
    std::fs::create_dir_all(&ctx.workspace).map_err(|e| {
        StageError::io(format!("failed to create {}", ctx.workspace.display()), e)
    })?;

    let url = source.clone_url();
    info!("Cloning {} ({})", url, branch);

    let mut clone = CommandSpec::new("git").args(["clone", "--quiet", "--branch", branch]);
    if source.fetch_depth > 0 {
        warn!("Shallow checkout with depth {}", source.fetch_depth);
        clone = clone.args(["--depth".to_string(), source.fetch_depth.to_string()]);
    }
    let clone = clone
        .arg(url)
        .arg(dir.to_string_lossy())
        .current_dir(&ctx.workspace);
    git(runner, clone).await?;

    if let Some(sha) = ctx.trigger.sha() {
        git(
            runner,
            CommandSpec::new("git")
                .args(["checkout", "--quiet", "--detach", sha])
                .current_dir(dir),
        )
        .await?;
    }

    if source.fetch_depth == 0 {
        let shallow = git(
            runner,
            CommandSpec::new("git")
                .args(["rev-parse", "--is-shallow-repository"])
                .current_dir(dir),
        )
        .await?;
        if shallow.trimmed() == "true" {
            info!("Source is shallow, fetching full history");
            git(
                runner,
                CommandSpec::new("git")
                    .args(["fetch", "--quiet", "--unshallow"])
                    .current_dir(dir),
            )
            .await?;
        }
    }

    let submodule_args: &[&str] = match source.submodules {
        SubmoduleMode::Recursive => &["submodule", "update", "--init", "--recursive"],
        SubmoduleMode::TopLevel => &["submodule", "update", "--init"],
        SubmoduleMode::Disabled => &[],
    };
    if !submodule_args.is_empty() {
        git(
            runner,
            CommandSpec::new("git")
                .args(submodule_args.iter().copied())
                .current_dir(dir),
        )
        .await?;
    }

    let head = git(
        runner,
        CommandSpec::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir),
    )
    .await?;
    let sha = head.trimmed().to_string();

    Ok(StageReport::new(format!(
        "checked out {} at {}",
        branch,
        &sha[..sha.len().min(8)]
    ))
    .with_sha(sha))
}

async fn git<R: CommandRunner + ?Sized>(
    runner: &R,
    spec: CommandSpec,
) -> Result<CommandOutput, StageError> {
    runner.run(&spec).await.map_err(StageError::Checkout)
}
