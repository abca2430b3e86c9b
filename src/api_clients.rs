// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use octocrab::Octocrab;
use tokio::sync::Semaphore;

use crate::github::{
    CommitAuthor, CreateCommitRequest, CreateRefRequest, CreateTreeRequest, CreatedPullRequest, GitCommit, GitRef,
    RefResponse, TreeEntry, TreeResponse, UpdateRefRequest,
};

const BOT_AUTHOR_NAME: &str = "atomist-bot";
const BOT_AUTHOR_EMAIL: &str = "bot@atomist.com";

/// The remote version-control operations the workflow consumes. One
/// implementation talks to GitHub, the mock drives the tests.
pub trait Client {
    async fn get_ref(&self, owner: &str, repo: &str, branch: &str) -> anyhow::Result<GitRef>;

    async fn create_ref(&self, owner: &str, repo: &str, branch: &str, sha: &str) -> anyhow::Result<GitRef>;

    /// Fetches a file's content at the repository's default branch state,
    /// decoded from its base64 transport encoding.
    async fn file_content(&self, owner: &str, repo: &str, path: &str) -> anyhow::Result<String>;

    /// Creates a tree merged against `base_tree`; returns the tree sha.
    async fn create_tree(&self, owner: &str, repo: &str, base_tree: &str, entries: &[TreeEntry])
        -> anyhow::Result<String>;

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> anyhow::Result<GitCommit>;

    /// Creates a commit with the fixed bot author identity; returns its sha.
    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> anyhow::Result<String>;

    /// Non-forced fast-forward of a branch; fails if the branch moved concurrently.
    async fn update_ref(&self, owner: &str, repo: &str, branch: &str, sha: &str) -> anyhow::Result<()>;

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> anyhow::Result<CreatedPullRequest>;
}

#[derive(Debug)]
pub struct RealClient {
    semaphore: Semaphore,
    octocrab: Arc<Octocrab>,
}

impl RealClient {
    /// Builds a client around the event-scoped installation token. Tokens
    /// arrive on the event, so there is one client per workflow run.
    pub fn new(access_token: &str, api_endpoint: &str) -> anyhow::Result<Arc<Self>> {
        let octocrab = Octocrab::builder()
            .personal_token(access_token.to_string())
            .base_uri(api_endpoint)
            .with_context(|| format!("failed to set base_uri to {api_endpoint}"))?
            .build()
            .context("failed to build octocrab client")?;

        Ok(Arc::new(Self {
            semaphore: Semaphore::new(5), // i.e. up to 5 API calls in parallel to the same GitHub instance
            octocrab: Arc::new(octocrab),
        }))
    }
}

impl Client for RealClient {
    async fn get_ref(&self, owner: &str, repo: &str, branch: &str) -> anyhow::Result<GitRef> {
        let _permit = self.semaphore.acquire().await?;

        let reference: RefResponse = self
            .octocrab
            .get(format!("/repos/{owner}/{repo}/git/ref/heads/{branch}"), None::<&()>)
            .await
            .with_context(|| format!("failed to get ref heads/{branch}"))?;

        Ok(GitRef {
            branch: branch.to_string(),
            sha: reference.object.sha,
        })
    }

    async fn create_ref(&self, owner: &str, repo: &str, branch: &str, sha: &str) -> anyhow::Result<GitRef> {
        let _permit = self.semaphore.acquire().await?;

        let new_ref = CreateRefRequest {
            ref_name: format!("refs/heads/{branch}"),
            sha: sha.to_string(),
        };
        let reference: RefResponse = self
            .octocrab
            .post(format!("/repos/{owner}/{repo}/git/refs"), Some(&new_ref))
            .await
            .with_context(|| format!("failed to create ref heads/{branch}"))?;

        Ok(GitRef {
            branch: branch.to_string(),
            sha: reference.object.sha,
        })
    }

    async fn file_content(&self, owner: &str, repo: &str, path: &str) -> anyhow::Result<String> {
        let _permit = self.semaphore.acquire().await?;

        let mut content_items = self
            .octocrab
            .repos(owner, repo)
            .get_content()
            .path(path)
            .send()
            .await
            .with_context(|| format!("failed to get content of {path}"))?;

        let items = content_items.take_items();
        let content = items
            .first()
            .ok_or_else(|| anyhow!("no content returned for {path}"))?;

        content
            .decoded_content()
            .ok_or_else(|| anyhow!("cannot decode base64 content of {path}"))
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> anyhow::Result<String> {
        let _permit = self.semaphore.acquire().await?;

        let new_tree = CreateTreeRequest {
            base_tree,
            tree: entries,
        };
        let tree: TreeResponse = self
            .octocrab
            .post(format!("/repos/{owner}/{repo}/git/trees"), Some(&new_tree))
            .await
            .with_context(|| format!("failed to create tree on {base_tree}"))?;

        Ok(tree.sha)
    }

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> anyhow::Result<GitCommit> {
        let _permit = self.semaphore.acquire().await?;

        self.octocrab
            .get(format!("/repos/{owner}/{repo}/git/commits/{sha}"), None::<&()>)
            .await
            .with_context(|| format!("failed to get commit {sha}"))
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> anyhow::Result<String> {
        let _permit = self.semaphore.acquire().await?;

        let new_commit = CreateCommitRequest {
            message,
            tree,
            parents: vec![parent],
            author: CommitAuthor {
                name: BOT_AUTHOR_NAME,
                email: BOT_AUTHOR_EMAIL,
                date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        };
        let commit: GitCommit = self
            .octocrab
            .post(format!("/repos/{owner}/{repo}/git/commits"), Some(&new_commit))
            .await
            .context("failed to create commit")?;

        Ok(commit.sha)
    }

    async fn update_ref(&self, owner: &str, repo: &str, branch: &str, sha: &str) -> anyhow::Result<()> {
        let _permit = self.semaphore.acquire().await?;

        let update = UpdateRefRequest { sha, force: false };
        let _reference: RefResponse = self
            .octocrab
            .patch(format!("/repos/{owner}/{repo}/git/refs/heads/{branch}"), Some(&update))
            .await
            .with_context(|| format!("failed to update ref heads/{branch} to {sha}"))?;

        Ok(())
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> anyhow::Result<CreatedPullRequest> {
        let _permit = self.semaphore.acquire().await?;

        let pr = self
            .octocrab
            .pulls(owner, repo)
            .create(title, head, base)
            .body(body)
            .maintainer_can_modify(true)
            .send()
            .await
            .context("failed to create pull request")?;

        let url = pr
            .html_url
            .as_ref()
            .ok_or_else(|| anyhow!("pr without an html link!?"))?
            .to_string();

        Ok(CreatedPullRequest { number: pr.number, url })
    }
}
