use crate::{
    config::RepositoryConfig,
    execution::{Version, VersionError},
};
use std::{
    io,
    path::PathBuf,
    process::{Command, Stdio},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Failed to run git: {0}")]
    Io(#[from] io::Error),
    #[error("`git {command}` failed: {stderr}")]
    Git { command: String, stderr: String },
    #[error("Unreadable version: {0}")]
    Version(#[from] VersionError),
    #[error("No version found at {0}")]
    NoVersion(String),
}

/// A branch head or tag of the tracked repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub git_ref: String,
    pub version: Version,
}

/// Local mirror of the benchmarked repository.
///
/// Implementations do not serialise callers, the planner holds the mirror for a whole pass.
pub trait RepositoryMirror: Send + Sync {
    /// bring the mirror up to date with its remote
    fn fetch(&self) -> Result<(), MirrorError>;

    fn resolve_head_commit(&self, branch: &str) -> Result<String, MirrorError>;

    fn list_release_branch_heads(&self) -> Result<Vec<Release>, MirrorError>;

    /// final release tags, pre-releases are left out
    fn list_release_tags(&self) -> Result<Vec<Release>, MirrorError>;

    fn resolve_version_at_commit(&self, sha: &str) -> Result<Version, MirrorError>;
}

/// `RepositoryMirror` backed by a bare clone driven through the git CLI
#[derive(Debug)]
pub struct GitMirror {
    git: PathBuf,
    path: PathBuf,
    remote: String,
    release_branch_prefix: String,
    version_file: PathBuf,
}

impl GitMirror {
    pub fn load(config: &RepositoryConfig) -> Self {
        Self {
            git: config.git.clone(),
            path: config.path.clone(),
            remote: config.remote.clone(),
            release_branch_prefix: config.release_branch_prefix.clone(),
            version_file: config.version_file.clone(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, MirrorError> {
        debug!(?args, "Running git");

        let output = Command::new(&self.git)
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(MirrorError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    fn version_at(&self, sha: &str) -> Result<Version, MirrorError> {
        let content = self.git(&[
            "show",
            &format!("{sha}:{}", self.version_file.to_string_lossy()),
        ])?;

        parse_version_file(&content).ok_or_else(|| MirrorError::NoVersion(sha.to_owned()))
    }
}

impl RepositoryMirror for GitMirror {
    #[instrument(skip(self), fields(remote = %self.remote), level = "info")]
    fn fetch(&self) -> Result<(), MirrorError> {
        if !self.path.join("HEAD").is_file() {
            info!(path = ?self.path, "Cloning mirror");

            let output = Command::new(&self.git)
                .arg("clone")
                .arg("--bare")
                .arg(&self.remote)
                .arg(&self.path)
                .stdin(Stdio::null())
                .output()?;

            if !output.status.success() {
                return Err(MirrorError::Git {
                    command: format!("clone --bare {}", self.remote),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                });
            }
        }

        self.git(&[
            "fetch",
            "--prune",
            "--tags",
            &self.remote,
            "+refs/heads/*:refs/heads/*",
        ])?;

        Ok(())
    }

    fn resolve_head_commit(&self, branch: &str) -> Result<String, MirrorError> {
        Ok(self
            .git(&["rev-parse", &format!("refs/heads/{branch}")])?
            .trim()
            .to_owned())
    }

    fn list_release_branch_heads(&self) -> Result<Vec<Release>, MirrorError> {
        let output = self.git(&[
            "for-each-ref",
            "--format=%(refname:short) %(objectname)",
            &format!("refs/heads/{}*", self.release_branch_prefix),
        ])?;

        let mut releases = Vec::new();
        for (name, sha) in parse_refs(&output) {
            match self.version_at(&sha) {
                Ok(version) => releases.push(Release {
                    name,
                    git_ref: sha,
                    version,
                }),
                Err(error) => warn!("Skipping release branch {name}: {error}"),
            }
        }

        Ok(releases)
    }

    fn list_release_tags(&self) -> Result<Vec<Release>, MirrorError> {
        // annotated tags have to be dereferenced to their commit
        let output = self.git(&[
            "for-each-ref",
            "--format=%(refname:short) %(*objectname) %(objectname)",
            "refs/tags/v*",
        ])?;

        Ok(parse_tags(&output))
    }

    fn resolve_version_at_commit(&self, sha: &str) -> Result<Version, MirrorError> {
        self.version_at(sha)
    }
}

/// (name, sha) pairs of `for-each-ref` output, the sha being the first non empty hash
fn parse_refs(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let sha = fields.next()?;

            Some((name.to_owned(), sha.to_owned()))
        })
        .collect()
}

fn parse_tags(output: &str) -> Vec<Release> {
    parse_refs(output)
        .into_iter()
        .filter(|(name, _)| !name.contains('-'))
        .filter_map(|(name, git_ref)| match name.parse::<Version>() {
            Ok(version) => Some(Release {
                name,
                git_ref,
                version,
            }),
            Err(error) => {
                debug!("Ignoring tag {name}: {error}");
                None
            }
        })
        .collect()
}

/// First quoted string in the file that reads as a version, or the whole file if it is one.
pub fn parse_version_file(content: &str) -> Option<Version> {
    content
        .split('"')
        .skip(1)
        .step_by(2)
        .find_map(|quoted| quoted.parse::<Version>().ok())
        .or_else(|| content.trim().parse().ok())
}
