// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sends one `GET` request to a Cloud Run service.

const DESCRIPTION: &str = concat!(
    "Loads the data source settings from a JSON file, decorates an HTTP client",
    " with Cloud Run authentication when the settings select it, and sends a",
    " single GET request. The service account key, if any, is read from a",
    " separate file, matching how data sources keep secrets apart from the",
    " rest of their settings."
);

use clap::Parser;
use cloud_run_auth::settings::{SERVICE_ACCOUNT_KEY_SECURE_FIELD, Settings};
use cloud_run_auth::{
    DefaultResolver, HttpClient, apply_google_cloud_run_auth, is_google_cloud_run_auth_configured,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Query a Cloud Run service with an ID token.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = DESCRIPTION)]
struct Args {
    /// The data source settings, as JSON.
    #[arg(long)]
    settings: PathBuf,

    /// A file with a service account key. When not set the credentials are
    /// found using Application Default Credentials.
    #[arg(long)]
    service_account_key: Option<PathBuf>,

    /// How long to wait for the metadata service, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    probe_timeout_ms: u64,

    /// The URL to query.
    url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::info!("{args:?}");

    let json = tokio::fs::read(&args.settings).await?;
    let mut secure = HashMap::new();
    if let Some(path) = &args.service_account_key {
        let key = tokio::fs::read_to_string(path).await?;
        secure.insert(SERVICE_ACCOUNT_KEY_SECURE_FIELD.to_string(), key);
    }
    let settings = Settings::from_plugin_json(&json, &secure)?;
    tracing::info!(
        "Cloud Run authentication configured: {}",
        is_google_cloud_run_auth_configured(&settings)
    );

    let resolver =
        DefaultResolver::default().with_probe_timeout(Duration::from_millis(args.probe_timeout_ms));
    let client = HttpClient::new(reqwest::Client::new());
    let client = apply_google_cloud_run_auth(client, &settings, &resolver).await?;

    let response = client.send(client.get(&args.url)).await?;
    tracing::info!("status = {}", response.status());
    println!("{}", response.text().await?);
    Ok(())
}
