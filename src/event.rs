use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload delivered by the commit subscription: one commit plus every
/// `FROM` line detected in the Dockerfile(s) it touched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub commit: Commit,
    #[serde(default)]
    pub dockerfile_froms: Vec<DockerfileReference>,
}

#[derive(Debug, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub repo: Repo,
}

#[derive(Debug, Deserialize)]
pub struct Repo {
    pub name: String,
    pub org: Org,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Org {
    pub name: String,
    pub github_access_token: String,
}

/// One detected `FROM` occurrence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerfileReference {
    pub repository: ImageRepository,
    /// Verbatim text following `FROM`, e.g. `"golang:1.17-alpine as build"`.
    pub dockerfile_line_args_string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRepository {
    pub host: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Completed,
    Info,
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Completed => write!(f, "completed"),
            State::Info => write!(f, "info"),
            State::Error => write!(f, "error"),
        }
    }
}

/// Outcome surfaced to the invoking runtime, the only output of a workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: State,
    pub reason: String,
}

impl Status {
    pub fn completed(reason: impl Into<String>) -> Self {
        Self {
            state: State::Completed,
            reason: reason.into(),
        }
    }

    pub fn info(reason: impl Into<String>) -> Self {
        Self {
            state: State::Info,
            reason: reason.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            state: State::Error,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.state, self.reason)
    }
}
