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

#![warn(clippy::pedantic)]

mod api_clients;
mod event;
mod github;
mod images;
mod push;
mod replace;
mod workflow;

use std::fs;
use std::io::{self, Read};

use anyhow::Context;
use api_clients::RealClient;
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use event::{PushEvent, State};
use tracing_subscriber::EnvFilter;
use url::Url;
use workflow::WorkflowOptions;

/// Replaces known public Docker base images with Chainguard distroless
/// images and opens a pull request with the change
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the JSON commit event payload, `-` reads from stdin
    event: String,

    /// The branch the pull request targets
    #[arg(
        long,
        default_value = "main",
        env = "BASE_BRANCH",
        hide_env_values = true,
        value_parser = NonEmptyStringValueParser::new()
    )]
    base_branch: String,

    /// Branch to commit to; generated from a timestamp when omitted
    #[arg(long)]
    commit_branch: Option<String>,

    /// Comma-separated list of files to rewrite
    #[arg(long, default_value = "Dockerfile")]
    files: String,

    /// Title of the created pull request
    #[arg(long, default_value = "Replace Docker base image(s) with Chainguard distroless")]
    pr_title: String,

    /// GitHub API endpoint
    #[arg(long, default_value = "https://api.github.com", env = "GITHUB_API_ENDPOINT", hide_env_values = true)]
    api_endpoint: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    Url::parse(&cli.api_endpoint).with_context(|| format!("invalid `--api-endpoint` {}", cli.api_endpoint))?;

    let event = read_event(&cli.event)?;

    let client = RealClient::new(&event.commit.repo.org.github_access_token, &cli.api_endpoint)?;
    let options = WorkflowOptions {
        base_branch: cli.base_branch,
        commit_branch: cli.commit_branch,
        files: cli.files,
        pr_title: cli.pr_title,
    };

    let status = workflow::handle_dockerfile_from(&event, &options, client.as_ref()).await;
    println!("{status}");

    if status.state == State::Error {
        std::process::exit(1);
    }

    Ok(())
}

fn read_event(path: &str) -> Result<PushEvent, anyhow::Error> {
    let raw = if path == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read event from stdin")?;
        buffer
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read event file {path}"))?
    };

    serde_json::from_str(&raw).context("failed to decode event payload")
}
