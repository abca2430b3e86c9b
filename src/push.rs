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

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use tracing::info;

use crate::api_clients::Client;
use crate::github::{CreatedPullRequest, GitRef, TreeEntry};
use crate::replace::replace_base_image;

const COMMIT_MESSAGE: &str = "Replace Docker base image(s)";

/// Returns the commit branch reference if it exists or creates it from the
/// base branch before returning it. Reusing an existing branch makes a
/// re-invocation after a failed later step safe.
pub async fn resolve_or_create_branch<C: Client>(
    client: &C,
    owner: &str,
    repo: &str,
    commit_branch: &str,
    base_branch: &str,
) -> Result<GitRef, anyhow::Error> {
    // Any lookup error means the branch has not been found and needs to be created.
    if let Ok(git_ref) = client.get_ref(owner, repo, commit_branch).await {
        return Ok(git_ref);
    }

    if commit_branch == base_branch {
        bail!("the commit branch does not exist but `--base-branch` is the same as `--commit-branch`");
    }
    if base_branch.is_empty() {
        bail!("`--base-branch` must not be empty when the branch specified by `--commit-branch` does not exist");
    }

    let base_ref = client
        .get_ref(owner, repo, base_branch)
        .await
        .with_context(|| format!("failed to look up base branch {base_branch}"))?;

    client
        .create_ref(owner, repo, commit_branch, &base_ref.sha)
        .await
        .with_context(|| format!("failed to create branch {commit_branch}"))
}

/// Fetches every file in the comma-separated `files` list, applies each
/// replacement in turn and stages the rewritten contents into one tree
/// anchored at the ref's current commit. Unlisted repository files are left
/// untouched by the tree's merge semantics.
pub async fn build_replacement_tree<C: Client>(
    client: &C,
    git_ref: &GitRef,
    files: &str,
    owner: &str,
    repo: &str,
    replacements: &BTreeMap<String, String>,
) -> Result<String, anyhow::Error> {
    let mut entries = Vec::new();

    for path in files.split(',') {
        let path = path.trim();
        if path.is_empty() {
            bail!("empty entry in `--files` parameter");
        }

        let content = client
            .file_content(owner, repo, path)
            .await
            .with_context(|| format!("failed to fetch content of {path}"))?;

        let mut replaced = content;
        for (base_image, new_base_image) in replacements {
            // Map keys carry the tag (e.g. "alpine:3.11"); the rewriter wants the bare name.
            let name = match base_image.split_once(':') {
                Some((name, _tag)) => name,
                None => base_image.as_str(),
            };
            replaced = replace_base_image(&replaced, name, new_base_image)?;
        }

        entries.push(TreeEntry::blob(path, replaced));
    }

    client
        .create_tree(owner, repo, &git_ref.sha, &entries)
        .await
        .context("failed to create tree")
}

/// Creates a commit carrying `tree_sha` on top of the ref's current commit
/// and fast-forwards the branch to it. The non-forced ref update is the
/// final step, so a concurrent branch move fails loudly instead of being
/// overwritten.
pub async fn push_commit<C: Client>(
    client: &C,
    git_ref: &GitRef,
    tree_sha: &str,
    owner: &str,
    repo: &str,
) -> Result<String, anyhow::Error> {
    let parent = client
        .get_commit(owner, repo, &git_ref.sha)
        .await
        .with_context(|| format!("failed to get parent commit {}", git_ref.sha))?;

    let new_sha = client
        .create_commit(owner, repo, COMMIT_MESSAGE, tree_sha, &parent.sha)
        .await
        .context("failed to create commit")?;

    client
        .update_ref(owner, repo, &git_ref.branch, &new_sha)
        .await
        .with_context(|| format!("failed to update ref heads/{}", git_ref.branch))?;

    Ok(new_sha)
}

/// Opens the pull request from the commit branch into the base branch.
/// A differing head owner turns the head into the cross-fork `owner:branch`
/// form; an unset base repo falls back to the head repo.
#[allow(clippy::too_many_arguments)]
pub async fn create_pull_request<C: Client>(
    client: &C,
    title: &str,
    base_owner: &str,
    head_owner: &str,
    head_branch: &str,
    base_repo: &str,
    head_repo: &str,
    base_branch: &str,
    body: &str,
) -> Result<CreatedPullRequest, anyhow::Error> {
    if title.is_empty() {
        bail!("missing `--pr-title`; refusing to open a pull request without a title");
    }

    let mut head = head_branch.to_string();
    let target_owner = if !base_owner.is_empty() && base_owner != head_owner {
        head = format!("{head_owner}:{head_branch}");
        base_owner
    } else {
        head_owner
    };
    let target_repo = if base_repo.is_empty() { head_repo } else { base_repo };

    let pr = client
        .create_pull_request(target_owner, target_repo, title, &head, base_branch, body)
        .await
        .context("failed to create pull request")?;

    info!(number = pr.number, url = %pr.url, "PR created");
    Ok(pr)
}

/// Renders the PR body. The format is load-bearing: downstream tooling
/// matches it byte for byte.
pub fn create_pull_request_body(replacements: &BTreeMap<String, String>) -> String {
    let mut body = String::from("This pull request replaces the following base image(s):\n");

    for (base_image, new_base_image) in replacements {
        body.push_str(&format!("- the Docker base image `{base_image}` to `{new_base_image}`\n"));
    }

    body.push_str(
        "\n---\n\nChainguard Images is a collection of container images designed for **minimalism** and **security**.\n\nMany of these images are **distroless**; they contain only an application and its runtime dependencies. There is no shell or package manager.\n\nThey provide **SBOM support** and **signatures** for known provenance and more secure base images.\n",
    );

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_clients::mock::MockClient;

    fn client_with_ref(branch: &str, sha: &str) -> MockClient {
        let client = MockClient::default();
        client.refs.lock().unwrap().insert(branch.to_string(), sha.to_string());
        client
    }

    #[tokio::test]
    async fn resolve_returns_existing_branch_without_creating() {
        let client = client_with_ref("hardened-images", "abc123");

        let git_ref = resolve_or_create_branch(&client, "acme", "hello", "hardened-images", "main")
            .await
            .unwrap();

        assert_eq!(git_ref.branch, "hardened-images");
        assert_eq!(git_ref.sha, "abc123");
        assert!(client.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_creates_missing_branch_from_base() {
        let client = client_with_ref("main", "base456");

        let git_ref = resolve_or_create_branch(&client, "acme", "hello", "hardened-images", "main")
            .await
            .unwrap();

        assert_eq!(git_ref.branch, "hardened-images");
        assert_eq!(git_ref.sha, "base456");
        assert_eq!(*client.mutations.lock().unwrap(), vec!["create_ref"]);
    }

    #[tokio::test]
    async fn resolve_rejects_creating_branch_from_itself() {
        let client = MockClient::default();

        let err = resolve_or_create_branch(&client, "acme", "hello", "main", "main")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("same as `--commit-branch`"));
        assert!(client.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_rejects_empty_base_branch() {
        let client = MockClient::default();

        let err = resolve_or_create_branch(&client, "acme", "hello", "hardened-images", "")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("must not be empty"));
        assert!(client.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tree_contains_rewritten_dockerfile_anchored_at_ref() {
        let client = client_with_ref("hardened-images", "abc123");
        client.contents.lock().unwrap().insert(
            "Dockerfile".to_string(),
            "FROM alpine:3.11\nCMD [\"/hello\"]\n".to_string(),
        );

        let git_ref = GitRef {
            branch: "hardened-images".to_string(),
            sha: "abc123".to_string(),
        };
        let replacements = BTreeMap::from([(
            "alpine:3.11".to_string(),
            "cgr.dev/chainguard/alpine-base".to_string(),
        )]);

        let tree_sha = build_replacement_tree(&client, &git_ref, "Dockerfile", "acme", "hello", &replacements)
            .await
            .unwrap();

        assert_eq!(tree_sha, "tree-0");
        let trees = client.trees.lock().unwrap();
        let (base_tree, entries) = &trees[0];
        assert_eq!(base_tree, "abc123");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "Dockerfile");
        assert_eq!(entries[0].mode, "100644");
        assert_eq!(entries[0].content, "FROM cgr.dev/chainguard/alpine-base\nCMD [\"/hello\"]\n");
    }

    #[tokio::test]
    async fn tree_builder_rejects_empty_files_entry() {
        let client = MockClient::default();
        let git_ref = GitRef {
            branch: "b".to_string(),
            sha: "abc".to_string(),
        };

        let err = build_replacement_tree(&client, &git_ref, "Dockerfile,,other", "acme", "hello", &BTreeMap::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("--files"));
        assert!(client.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tree_builder_aborts_when_a_file_is_missing() {
        let client = MockClient::default();
        let git_ref = GitRef {
            branch: "b".to_string(),
            sha: "abc".to_string(),
        };

        let err = build_replacement_tree(&client, &git_ref, "Dockerfile", "acme", "hello", &BTreeMap::new())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("Dockerfile"));
        assert!(client.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_commit_parents_on_ref_and_updates_branch() {
        let client = client_with_ref("hardened-images", "abc123");
        let git_ref = GitRef {
            branch: "hardened-images".to_string(),
            sha: "abc123".to_string(),
        };

        let new_sha = push_commit(&client, &git_ref, "tree-0", "acme", "hello").await.unwrap();

        assert_eq!(new_sha, "commit-0");
        let commits = client.commits.lock().unwrap();
        assert_eq!(commits[0], ("Replace Docker base image(s)".to_string(), "tree-0".to_string(), "abc123".to_string()));
        assert_eq!(client.refs.lock().unwrap().get("hardened-images"), Some(&"commit-0".to_string()));
        assert_eq!(*client.mutations.lock().unwrap(), vec!["create_commit", "update_ref"]);
    }

    #[tokio::test]
    async fn empty_pr_title_fails_without_remote_call() {
        let client = MockClient::default();

        let err = create_pull_request(&client, "", "acme", "acme", "branch", "hello", "hello", "main", "body")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("--pr-title"));
        assert!(client.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cross_fork_head_is_owner_qualified() {
        let client = MockClient::default();

        create_pull_request(
            &client,
            "Replace Docker base image(s) with Chainguard distroless",
            "upstream",
            "fork",
            "hardened-images",
            "hello",
            "hello",
            "main",
            "body",
        )
        .await
        .unwrap();

        let pulls = client.pulls.lock().unwrap();
        assert_eq!(pulls[0].owner, "upstream");
        assert_eq!(pulls[0].head, "fork:hardened-images");
        assert_eq!(pulls[0].base, "main");
    }

    #[tokio::test]
    async fn same_owner_head_stays_unqualified() {
        let client = MockClient::default();

        create_pull_request(
            &client,
            "Replace Docker base image(s) with Chainguard distroless",
            "acme",
            "acme",
            "hardened-images",
            "",
            "hello",
            "main",
            "body",
        )
        .await
        .unwrap();

        let pulls = client.pulls.lock().unwrap();
        assert_eq!(pulls[0].owner, "acme");
        assert_eq!(pulls[0].repo, "hello");
        assert_eq!(pulls[0].head, "hardened-images");
    }

    #[test]
    fn pull_request_body_matches_expected_format() {
        let replacements = BTreeMap::from([
            (
                "alpine:3.11".to_string(),
                "cgr.dev/chainguard/alpine-base".to_string(),
            ),
            ("golang:1.17-alpine".to_string(), "cgr.dev/chainguard/go".to_string()),
        ]);

        let expected = "This pull request replaces the following base image(s):
- the Docker base image `alpine:3.11` to `cgr.dev/chainguard/alpine-base`
- the Docker base image `golang:1.17-alpine` to `cgr.dev/chainguard/go`

---

Chainguard Images is a collection of container images designed for **minimalism** and **security**.

Many of these images are **distroless**; they contain only an application and its runtime dependencies. There is no shell or package manager.

They provide **SBOM support** and **signatures** for known provenance and more secure base images.
";

        assert_eq!(create_pull_request_body(&replacements), expected);
    }
}
