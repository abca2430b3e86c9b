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

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use crate::api_clients::Client;
use crate::event::{PushEvent, Status};
use crate::images::build_replacement_set;
use crate::push;

#[derive(Clone, Debug)]
pub struct WorkflowOptions {
    pub base_branch: String,
    /// Fixed commit branch name; generated from a timestamp when unset.
    pub commit_branch: Option<String>,
    /// Comma-separated list of files to rewrite.
    pub files: String,
    pub pr_title: String,
}

/// Runs the whole replacement workflow for one event: map the detected base
/// images, resolve the commit branch, build the rewritten tree, push the
/// commit and open the pull request. Every step blocks on the previous one;
/// the first failure aborts the rest. An already pushed commit is not rolled
/// back when PR creation fails, that state is surfaced as an error.
pub async fn handle_dockerfile_from<C: Client>(event: &PushEvent, options: &WorkflowOptions, client: &C) -> Status {
    match run(event, options, client).await {
        Ok(status) => status,
        Err(err) => Status::error(format!("{err:#}")),
    }
}

async fn run<C: Client>(event: &PushEvent, options: &WorkflowOptions, client: &C) -> Result<Status, anyhow::Error> {
    let commit = &event.commit;
    info!(
        org = %commit.repo.org.name,
        repo = %commit.repo.name,
        revision = %commit.sha,
        message = %commit.message,
        "new commit"
    );

    let (replacements, unmatched) = build_replacement_set(&event.dockerfile_froms);
    if replacements.is_empty() {
        return Ok(Status::info(format!(
            "unable to identify Chainguard distroless image replacement for [{}]",
            unmatched.join(", ")
        )));
    }
    info!(?replacements, "replacing base images");

    let source_owner = &commit.repo.org.name;
    let source_repo = &commit.repo.name;
    let commit_branch = options.commit_branch.clone().unwrap_or_else(|| {
        format!(
            "replace-docker-base-image-with-chainguard-distroless-{}",
            Utc::now().timestamp()
        )
    });

    let git_ref = push::resolve_or_create_branch(client, source_owner, source_repo, &commit_branch, &options.base_branch)
        .await
        .context("unable to get/create the commit reference")?;

    let tree_sha = push::build_replacement_tree(client, &git_ref, &options.files, source_owner, source_repo, &replacements)
        .await
        .context("unable to create the tree based on the provided files")?;

    push::push_commit(client, &git_ref, &tree_sha, source_owner, source_repo)
        .await
        .context("unable to create the commit")?;

    push::create_pull_request(
        client,
        &options.pr_title,
        source_owner,
        source_owner,
        &commit_branch,
        source_repo,
        source_repo,
        &options.base_branch,
        &push::create_pull_request_body(&replacements),
    )
    .await
    .context("error while creating the pull request")?;

    Ok(Status::completed("Handled Git push"))
}
