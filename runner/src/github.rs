use crate::config::PullRequestConfig;
use serde::Deserialize;
use std::{
    io,
    path::PathBuf,
    process::{Command, Stdio},
};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum PullRequestError {
    #[error("Failed to run gh: {0}")]
    Io(#[from] io::Error),
    #[error("`gh {command}` failed: {stderr}")]
    Gh { command: String, stderr: String },
    #[error("Unexpected response from GitHub: {0}")]
    Response(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub head: String,
    pub base: String,
}

/// Issue tracker holding the pull requests to benchmark
pub trait PullRequestSource: Send + Sync {
    fn list_open_with_label(&self, label: &str) -> Result<Vec<PullRequest>, PullRequestError>;
}

#[derive(Deserialize)]
struct ListedPull {
    number: u64,
}

#[derive(Deserialize)]
struct Commit {
    sha: String,
}

#[derive(Deserialize)]
struct PullDetails {
    number: u64,
    head: Commit,
    base: Commit,
}

/// `PullRequestSource` talking to GitHub through an authenticated `gh` CLI
#[derive(Debug, Clone)]
pub struct GhCli {
    gh: PathBuf,
    repository: String,
}

impl GhCli {
    pub fn load(config: &PullRequestConfig) -> Self {
        Self {
            gh: config.gh.clone(),
            repository: config.repository.clone(),
        }
    }

    fn gh(&self, args: &[&str]) -> Result<String, PullRequestError> {
        debug!(?args, "Running gh");

        let output = Command::new(&self.gh)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(PullRequestError::Gh {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

impl PullRequestSource for GhCli {
    #[instrument(skip(self), fields(repository = %self.repository), level = "debug")]
    fn list_open_with_label(&self, label: &str) -> Result<Vec<PullRequest>, PullRequestError> {
        let listed = parse_listed(&self.gh(&[
            "pr",
            "list",
            "--repo",
            &self.repository,
            "--label",
            label,
            "--state",
            "open",
            "--json",
            "number",
        ])?)?;

        listed
            .into_iter()
            .map(|number| {
                parse_details(&self.gh(&[
                    "api",
                    &format!("repos/{}/pulls/{number}", self.repository),
                ])?)
            })
            .collect()
    }
}

fn parse_listed(output: &str) -> Result<Vec<u64>, serde_json::Error> {
    Ok(serde_json::from_str::<Vec<ListedPull>>(output)?
        .into_iter()
        .map(|pull| pull.number)
        .collect())
}

fn parse_details(output: &str) -> Result<PullRequest, PullRequestError> {
    let details: PullDetails = serde_json::from_str(output)?;

    Ok(PullRequest {
        number: details.number,
        head: details.head.sha,
        base: details.base.sha,
    })
}
