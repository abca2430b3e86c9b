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

use serde::{Deserialize, Serialize};

/// A branch pointer in the remote object graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitRef {
    pub branch: String,
    pub sha: String,
}

/// A commit object, reduced to what the workflow needs (the sha to parent on).
#[derive(Clone, Debug, Deserialize)]
pub struct GitCommit {
    pub sha: String,
}

#[derive(Clone, Debug)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub url: String,
}

// Wire types for the git database endpoints octocrab has no builder for.

#[derive(Debug, Serialize)]
pub struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateRefRequest<'a> {
    pub sha: &'a str,
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefResponse {
    pub object: RefObject,
}

#[derive(Debug, Deserialize)]
pub struct RefObject {
    pub sha: String,
}

/// One file staged into a new tree; content is the full post-rewrite text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub entry_type: &'static str,
    pub content: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644",
            entry_type: "blob",
            content: content.into(),
        }
    }
}

/// The created tree merges against `base_tree`, leaving unlisted paths untouched.
#[derive(Debug, Serialize)]
pub struct CreateTreeRequest<'a> {
    pub base_tree: &'a str,
    pub tree: &'a [TreeEntry],
}

#[derive(Debug, Deserialize)]
pub struct TreeResponse {
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub struct CommitAuthor<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCommitRequest<'a> {
    pub message: &'a str,
    pub tree: &'a str,
    pub parents: Vec<&'a str>,
    pub author: CommitAuthor<'a>,
}
