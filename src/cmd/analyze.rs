//! Local analysis command: `perflens analyze`.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};

use perflens::config::{Credentials, PerflensToml, env_lookup};
use perflens::pipeline::Artifact;
use perflens::review::OutputFormat;

use super::{artifact_runner, session_store};

pub async fn cmd_analyze(project_dir: &Path, files: &[PathBuf], format: &str) -> Result<()> {
    let format: OutputFormat = format.parse()?;
    let api_key = Credentials::anthropic_key(env_lookup)?;
    let config = PerflensToml::load_or_default(project_dir)?;

    let artifacts = files
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(Artifact::new(path.to_string_lossy(), content))
        })
        .collect::<Result<Vec<_>>>()?;

    let store = session_store(&config, project_dir);
    let runner = artifact_runner(&config, store.clone(), api_key);
    let (results, memory) = runner.analyze_all(&artifacts, format).await;

    let formatter = format.formatter();
    for result in &results {
        eprintln!("{} {}", style("▶").cyan(), result.file);
        match (&result.summary, &result.error) {
            (Some(summary), _) if result.success => {
                println!("{}", formatter.format(&result.issues, summary));
            }
            (_, error) => eprintln!(
                "{} Analysis failed: {}",
                style("✗").red(),
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    if let Some(warning) = memory.recurring_warning() {
        eprintln!("{} {}", style("!").yellow(), warning);
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} file(s) could not be analyzed", failed, results.len());
    }
    Ok(())
}
