//! Publishing: commit the generated site to the target branch and push it

use crate::core::RunContext;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::stages::sync::{apply_sync, plan_sync, MergePolicy};
use crate::stages::{reset_dir, StageError, StageReport};
use std::fs;
use tracing::{debug, info};

/// Variable the credential helper reads the deploy token from
const TOKEN_VAR: &str = "SITEPIPE_DEPLOY_TOKEN";

/// One-shot helper answering git's credential request from [`TOKEN_VAR`]
const CREDENTIAL_HELPER: &str = "credential.helper=!f() { echo username=x-access-token; echo \"password=$SITEPIPE_DEPLOY_TOKEN\"; }; f";

/// Publish `ctx.output_dir()` to the configured branch
pub async fn run<R: CommandRunner + ?Sized>(
    runner: &R,
    ctx: &RunContext,
) -> Result<StageReport, StageError> {
    let publish = &ctx.config.publish;
    let branch = publish.branch.as_str();
    let dir = &ctx.publish_dir;

    let token = match &publish.token_env {
        Some(var) => match std::env::var(var) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => return Err(StageError::MissingCredential(var.clone())),
        },
        None => None,
    };
    let secrets: Vec<String> = token.iter().cloned().collect();
    let remote = publish.remote_url();
    let git = |args: &[&str]| {
        CommandSpec::new("git")
            .args(args.iter().copied())
            .current_dir(dir)
            .secrets(secrets.iter().cloned())
    };
    // Commands talking to the remote get the credential for that call only
    let remote_git = |args: &[&str]| match &token {
        Some(token) => CommandSpec::new("git")
            .args(["-c", "credential.helper=", "-c", CREDENTIAL_HELPER])
            .args(args.iter().copied())
            .env(TOKEN_VAR, token.as_str())
            .current_dir(dir)
            .secrets(secrets.iter().cloned()),
        None => git(args),
    };

    reset_dir(dir)?;
    fs::create_dir_all(&ctx.workspace).map_err(|e| {
        StageError::io(format!("failed to create {}", ctx.workspace.display()), e)
    })?;

    let heads = run_git(
        runner,
        remote_git(&["ls-remote", "--heads", remote.as_str(), branch]).current_dir(&ctx.workspace),
    )
    .await?;

    if heads.stdout.trim().is_empty() {
        info!("Branch {} does not exist yet, starting it", branch);
        fs::create_dir_all(dir)
            .map_err(|e| StageError::io(format!("failed to create {}", dir.display()), e))?;
        run_git(runner, git(&["init", "--quiet"])).await?;
        run_git(runner, git(&["checkout", "--quiet", "--orphan", branch])).await?;
        run_git(runner, git(&["remote", "add", "origin", remote.as_str()])).await?;
    } else {
        info!("Fetching {} from {}", branch, remote);
        let target = dir.to_string_lossy();
        run_git(
            runner,
            remote_git(&[
                "clone",
                "--quiet",
                "--depth",
                "1",
                "--single-branch",
                "--branch",
                branch,
                remote.as_str(),
                target.as_ref(),
            ])
            .current_dir(&ctx.workspace),
        )
        .await?;
    }

    let output = ctx.output_dir();
    let policy = MergePolicy::from_keep_files(publish.keep_files);
    let plan = plan_sync(&output, dir, policy, &publish.exclude)
        .map_err(|e| StageError::io("failed to plan publish", e))?;
    let written = apply_sync(&plan, &output, dir)
        .map_err(|e| StageError::io("failed to stage generated files", e))?;
    debug!(
        "Staged {} files, preserved {}, removed {}",
        written,
        plan.preserve.len(),
        plan.remove.len()
    );

    if let Some(cname) = &publish.cname {
        fs::write(dir.join("CNAME"), format!("{}\n", cname))
            .map_err(|e| StageError::io("failed to write CNAME", e))?;
    }
    if publish.nojekyll {
        fs::write(dir.join(".nojekyll"), "")
            .map_err(|e| StageError::io("failed to write .nojekyll", e))?;
    }

    run_git(runner, git(&["add", "--all"])).await?;
    let status = run_git(runner, git(&["status", "--porcelain"])).await?;
    if status.stdout.trim().is_empty() {
        info!("Nothing to publish, {} is up to date", branch);
        return Ok(StageReport::new(format!("{} already up to date", branch)));
    }

    let message = publish.render_commit_message(
        &ctx.commit_label(),
        &ctx.trigger.git_ref(),
        &ctx.config.name,
    );
    let name = format!("user.name={}", publish.user_name);
    let email = format!("user.email={}", publish.user_email);
    run_git(
        runner,
        git(&[
            "-c",
            name.as_str(),
            "-c",
            email.as_str(),
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            message.as_str(),
        ]),
    )
    .await?;
    run_git(runner, remote_git(&["push", "--quiet", "origin", branch])).await?;

    Ok(StageReport::new(format!(
        "pushed {} files to {} ({} kept, {} removed)",
        written,
        branch,
        plan.preserve.len(),
        plan.remove.len()
    )))
}

async fn run_git<R: CommandRunner + ?Sized>(
    runner: &R,
    spec: CommandSpec,
) -> Result<CommandOutput, StageError> {
    runner.run(&spec).await.map_err(StageError::Publish)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::{failure, ScriptedRunner};
    use crate::stages::testing::{context, WORKFLOW};
    use tempfile::TempDir;

    fn write_output(ctx: &RunContext) {
        let out = ctx.output_dir();
        fs::create_dir_all(out.join("css")).unwrap();
        fs::write(out.join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(out.join("css/site.css"), "body{}").unwrap();
    }

    /// Git subcommand of `spec`, after any `-c` options
    fn subcommand(spec: &CommandSpec) -> Option<&str> {
        let mut args = spec.args.iter().map(String::as_str);
        while let Some(arg) = args.next() {
            if arg == "-c" {
                args.next();
            } else {
                return Some(arg);
            }
        }
        None
    }

    /// Target branch missing remotely; `status` reports pending changes
    fn new_branch_runner() -> ScriptedRunner {
        ScriptedRunner::new(|spec| {
            Ok(match subcommand(spec) {
                Some("status") => CommandOutput::new("A  index.html\n"),
                _ => CommandOutput::default(),
            })
        })
    }

    #[tokio::test]
    async fn test_first_publish_starts_orphan_branch() {
        let dir = TempDir::new().unwrap();
        let ctx = context(WORKFLOW, dir.path(), Some("abc123"));
        write_output(&ctx);
        let runner = new_branch_runner();

        let report = run(&runner, &ctx).await.unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "git ls-remote --heads https://example.com/owner/site.git master",
                "git init --quiet",
                "git checkout --quiet --orphan master",
                "git remote add origin https://example.com/owner/site.git",
                "git add --all",
                "git status --porcelain",
                "git -c user.name=sitepipe[bot] -c user.email=sitepipe[bot]@users.noreply.github.com -c commit.gpgsign=false commit --quiet -m deploy: abc123",
                "git push --quiet origin master",
            ]
        );
        assert!(ctx.publish_dir.join("index.html").is_file());
        assert!(ctx.publish_dir.join("css/site.css").is_file());
        assert!(report.summary.starts_with("pushed 2 files to master"));
    }

    #[tokio::test]
    async fn test_existing_branch_is_cloned_and_foreign_files_kept() {
        let dir = TempDir::new().unwrap();
        let ctx = context(WORKFLOW, dir.path(), None);
        write_output(&ctx);
        let publish_dir = ctx.publish_dir.clone();
        let runner = ScriptedRunner::new(move |spec| {
            Ok(match subcommand(spec) {
                Some("ls-remote") => CommandOutput::new("1111\trefs/heads/master\n"),
                Some("clone") => {
                    fs::create_dir_all(publish_dir.join(".git")).unwrap();
                    fs::write(publish_dir.join("index.html"), "old").unwrap();
                    fs::write(publish_dir.join("google123.html"), "verify").unwrap();
                    CommandOutput::default()
                }
                Some("status") => CommandOutput::new(" M index.html\n"),
                _ => CommandOutput::default(),
            })
        });

        let report = run(&runner, &ctx).await.unwrap();

        let lines = runner.command_lines();
        assert!(lines[1].starts_with(
            "git clone --quiet --depth 1 --single-branch --branch master https://example.com/owner/site.git"
        ));
        assert!(!lines.iter().any(|l| l.contains("--orphan")));
        assert_eq!(
            fs::read_to_string(ctx.publish_dir.join("index.html")).unwrap(),
            "<h1>home</h1>"
        );
        assert!(ctx.publish_dir.join("google123.html").is_file());
        assert!(report.summary.contains("1 kept"));
    }

    #[tokio::test]
    async fn test_unchanged_site_is_not_committed() {
        let dir = TempDir::new().unwrap();
        let ctx = context(WORKFLOW, dir.path(), None);
        write_output(&ctx);
        let runner = ScriptedRunner::succeeding();

        let report = run(&runner, &ctx).await.unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines.last().unwrap(), "git status --porcelain");
        assert!(!lines.iter().any(|l| l.contains("push")));
        assert_eq!(report.summary, "master already up to date");
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_command() {
        let dir = TempDir::new().unwrap();
        let yaml = WORKFLOW.replace(
            "  branch: \"master\"",
            "  branch: \"master\"\n  token_env: \"SITEPIPE_TEST_UNSET_TOKEN\"",
        );
        let ctx = context(&yaml, dir.path(), None);
        let runner = ScriptedRunner::succeeding();

        let err = run(&runner, &ctx).await.unwrap_err();

        assert!(matches!(err, StageError::MissingCredential(ref v) if v == "SITEPIPE_TEST_UNSET_TOKEN"));
        assert!(runner.command_lines().is_empty());
    }

    #[tokio::test]
    async fn test_token_is_passed_per_command_and_redacted_from_errors() {
        let dir = TempDir::new().unwrap();
        let yaml = WORKFLOW.replace(
            "  branch: \"master\"",
            "  branch: \"master\"\n  token_env: \"SITEPIPE_TEST_PUBLISH_TOKEN\"",
        );
        std::env::set_var("SITEPIPE_TEST_PUBLISH_TOKEN", "ghp_s3cr3t");
        let ctx = context(&yaml, dir.path(), None);
        write_output(&ctx);
        let runner = ScriptedRunner::new(|spec| match subcommand(spec) {
            Some("push") => Err(failure(spec, "remote: Permission denied")),
            Some("status") => Ok(CommandOutput::new("A  index.html\n")),
            _ => Ok(CommandOutput::default()),
        });

        let err = run(&runner, &ctx).await.unwrap_err();

        let calls = runner.calls();
        assert!(calls
            .iter()
            .all(|c| c.args.iter().all(|a| !a.contains("ghp_s3cr3t"))));
        assert!(runner
            .command_lines()
            .contains(&"git remote add origin https://example.com/owner/site.git".to_string()));

        let networked: Vec<&CommandSpec> = calls
            .iter()
            .filter(|c| matches!(subcommand(c), Some("ls-remote" | "push")))
            .collect();
        assert_eq!(networked.len(), 2);
        for call in networked {
            assert!(call.args.contains(&CREDENTIAL_HELPER.to_string()));
            assert_eq!(
                call.env,
                vec![(TOKEN_VAR.to_string(), "ghp_s3cr3t".to_string())]
            );
            assert_eq!(call.secrets, vec!["ghp_s3cr3t".to_string()]);
        }
        let local = calls
            .iter()
            .find(|c| subcommand(c) == Some("remote"))
            .unwrap();
        assert!(local.env.is_empty());

        assert!(matches!(err, StageError::Publish(_)));
        assert!(!err.to_string().contains("ghp_s3cr3t"));
    }

    #[tokio::test]
    async fn test_cname_and_nojekyll_are_written() {
        let dir = TempDir::new().unwrap();
        let yaml = WORKFLOW.replace(
            "  branch: \"master\"",
            "  branch: \"master\"\n  cname: \"blog.example.com\"\n  nojekyll: true",
        );
        let ctx = context(&yaml, dir.path(), None);
        write_output(&ctx);
        let runner = new_branch_runner();

        run(&runner, &ctx).await.unwrap();

        assert_eq!(
            fs::read_to_string(ctx.publish_dir.join("CNAME")).unwrap(),
            "blog.example.com\n"
        );
        assert!(ctx.publish_dir.join(".nojekyll").is_file());
    }
}
