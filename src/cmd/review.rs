//! Pull request review command: `perflens review`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use perflens::config::{Credentials, PerflensToml, env_lookup};
use perflens::github::{GitHubClient, parse_pr_reference};
use perflens::review::{ReviewPolicy, Severity};
use perflens::workflow::PrWorkflow;

use super::{artifact_runner, session_store};

pub async fn cmd_review(
    project_dir: &Path,
    pr: &str,
    severity: Option<&str>,
    auto_approve: bool,
    analyze_only: bool,
) -> Result<()> {
    let reference = parse_pr_reference(pr)?;
    let creds = Credentials::resolve(env_lookup, reference.repository.is_none())?;
    let config = PerflensToml::load_or_default(project_dir)?;

    let threshold = match severity {
        Some(s) => s.parse::<Severity>()?,
        None => config.review.severity,
    };
    let auto_approve = auto_approve || config.review.auto_approve;

    let repository = match reference.repository {
        Some(from_url) => {
            if let Some(from_env) = creds.repository.as_deref()
                && from_env != from_url
            {
                tracing::info!(url = %from_url, env = %from_env, "Using repository from PR URL");
            }
            from_url
        }
        None => creds
            .repository
            .clone()
            .context("GITHUB_REPOSITORY is required when the PR is given by number")?,
    };

    let mut host = GitHubClient::new(creds.github_token, repository.clone())
        .with_extensions(config.files.extensions.clone());
    if let Some(api_base) = env_lookup("GITHUB_API_URL") {
        host = host.with_api_base(api_base);
    }

    let store = session_store(&config, project_dir);
    let runner = artifact_runner(&config, store.clone(), creds.anthropic_api_key);
    let policy = ReviewPolicy::new(threshold, auto_approve).with_footer(config.review.footer.clone());
    let workflow = PrWorkflow::new(Arc::new(host), store, runner, policy);

    eprintln!(
        "{} Reviewing {}#{} (threshold: {}{})",
        style("▶").cyan(),
        repository,
        reference.number,
        threshold,
        if analyze_only { ", analyze only" } else { "" }
    );

    let outcome = workflow
        .analyze_and_review(reference.number, analyze_only)
        .await
        .with_context(|| format!("Failed to analyze {}#{}", repository, reference.number))?;

    let analysis = &outcome.analysis;
    let failed = analysis.results.iter().filter(|r| !r.success).count();
    eprintln!(
        "{} {} file(s) analyzed, {} issue(s) found{}",
        style("✓").green(),
        analysis.files_analyzed,
        analysis.total_issues,
        if failed > 0 {
            format!(", {} file(s) failed", failed)
        } else {
            String::new()
        }
    );
    if let Some(warning) = &analysis.recurring_warning {
        eprintln!("{} {}", style("!").yellow(), warning);
    }

    if let (true, Some(event)) = (outcome.review_posted, outcome.review_event) {
        eprintln!(
            "{} Review posted: {} with {} comment(s)",
            style("✓").green(),
            event.label(),
            outcome.comments_posted
        );
    } else if let Some(error) = &outcome.error {
        eprintln!("{} Review not posted: {}", style("✗").red(), error);
    } else if let Some(reason) = &outcome.reason {
        eprintln!("{} {}", style("-").dim(), reason);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize review outcome")?
    );
    Ok(())
}
