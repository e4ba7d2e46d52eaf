//! Site generation with the configured generator

use crate::core::RunContext;
use crate::process::{CommandRunner, CommandSpec};
use crate::stages::{reset_dir, StageError, StageReport};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Run the generator over the checked-out tree
pub async fn run<R: CommandRunner + ?Sized>(
    runner: &R,
    ctx: &RunContext,
) -> Result<StageReport, StageError> {
    let generator = &ctx.config.generator;
    let tree = &ctx.checkout_dir;

    if let Some(expected) = generator.expected_version() {
        let spec = CommandSpec::new(&generator.command)
            .args(generator.version_args.iter().cloned())
            .current_dir(tree);
        let output = runner.run(&spec).await.map_err(StageError::Generator)?;
        let found = parse_generator_version(&output.stdout).unwrap_or_else(|| {
            output
                .stdout
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        });
        if !generator.accepts_version(&found) {
            return Err(StageError::VersionMismatch { expected, found });
        }
        debug!("Generator version {} verified", found);
    }

    let output_dir = ctx.output_dir();
    reset_dir(&output_dir)?;

    let mut spec = CommandSpec::new(&generator.command)
        .args(generator.build_args())
        .current_dir(tree);
    for (key, value) in &generator.env {
        spec = spec.env(key, value);
    }
    info!("Running {}", spec.display());
    runner.run(&spec).await.map_err(StageError::Generator)?;

    if !output_dir.is_dir() {
        return Err(StageError::MissingOutput(output_dir));
    }

    let files = WalkDir::new(&output_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count();

    Ok(StageReport::new(format!(
        "generated {} files in {}",
        files,
        generator.output_dir.display()
    )))
}

/// Extract `X.Y.Z` or `X.Y.Z+extended` from generator version output
///
/// Handles both `hugo v0.119.0-8fd...+extended linux/amd64` and
/// `Hugo Static Site Generator v0.80.0/extended`.
pub fn parse_generator_version(output: &str) -> Option<String> {
    let re = Regex::new(r"v?(\d+\.\d+\.\d+)\S*").ok()?;
    let caps = re.captures(output)?;
    let version = caps.get(1)?.as_str();
    let token = caps.get(0)?.as_str();
    let extended = token.contains("+extended")
        || token.contains("/extended")
        || output.lines().next().is_some_and(|l| l.contains("extended"));

    Some(if extended {
        format!("{}+extended", version)
    } else {
        version.to_string()
    })
}
