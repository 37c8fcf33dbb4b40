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

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use crate::credentials::{IDTokenCredentials, adc, service_account};
use crate::settings::{AuthenticationMethod, Settings};
use crate::transport::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

const SERVICE_ACCOUNT_KEY_CONTEXT: &str = "error creating credentials from JSON";
const DEFAULT_CREDENTIALS_CONTEXT: &str = "error creating token source";

/// The errors returned by [apply_google_cloud_run_auth].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The settings select Cloud Run authentication without an audience.
    #[error("Google Cloud Run audience is required")]
    MissingAudience,
    /// The credentials could not be created.
    #[error("{context}: {source}")]
    Credentials {
        context: &'static str,
        #[source]
        source: BuilderError,
    },
}

impl Error {
    /// The audience is missing from the settings.
    pub fn is_missing_audience(&self) -> bool {
        matches!(self, Error::MissingAudience)
    }

    /// Creating the credentials failed. The source has the details.
    pub fn is_credentials(&self) -> bool {
        matches!(self, Error::Credentials { .. })
    }
}

/// Creates the credentials used by [apply_google_cloud_run_auth].
///
/// Applications use [DefaultResolver]. Tests may substitute their own
/// implementation to avoid contacting token endpoints.
#[async_trait]
pub trait CredentialsResolver: Send + Sync {
    /// Creates credentials from a JSON service account key.
    async fn from_service_account_key(
        &self,
        key: Vec<u8>,
        audience: String,
    ) -> BuildResult<IDTokenCredentials>;

    /// Creates credentials from the environment, using Application Default
    /// Credentials.
    async fn from_default(&self, audience: String) -> BuildResult<IDTokenCredentials>;
}

/// Resolves credentials with the builders in [crate::credentials].
#[derive(Clone, Debug, Default)]
pub struct DefaultResolver {
    metadata_endpoint: Option<String>,
    probe_timeout: Option<Duration>,
}

impl DefaultResolver {
    /// Sets the metadata service endpoint used by Application Default
    /// Credentials.
    pub fn with_metadata_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.metadata_endpoint = Some(endpoint.into());
        self
    }

    /// Sets how long to wait for the metadata service to answer.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CredentialsResolver for DefaultResolver {
    async fn from_service_account_key(
        &self,
        key: Vec<u8>,
        audience: String,
    ) -> BuildResult<IDTokenCredentials> {
        let json = serde_json::from_slice(&key).map_err(BuilderError::parsing)?;
        service_account::Builder::new(audience, json).build()
    }

    async fn from_default(&self, audience: String) -> BuildResult<IDTokenCredentials> {
        let builder = adc::Builder::new(audience);
        let builder = self
            .metadata_endpoint
            .iter()
            .fold(builder, |b, e| b.with_metadata_endpoint(e));
        let builder = self
            .probe_timeout
            .iter()
            .fold(builder, |b, t| b.with_probe_timeout(*t));
        builder.build().await
    }
}

/// Returns `true` if the settings select Cloud Run authentication.
pub fn is_google_cloud_run_auth_configured(settings: &Settings) -> bool {
    settings.auth_method == AuthenticationMethod::GoogleCloudRun
}

/// Decorates `client` to send ID tokens for the Cloud Run audience.
///
/// If the settings do not select Cloud Run authentication, `client` is
/// returned unchanged. Otherwise the audience must be set. With a service
/// account key in the settings the tokens are issued for that key, without
/// one the credentials are discovered from the environment.
///
/// # Errors
///
/// Returns [Error::MissingAudience] if the audience is empty, nothing else is
/// attempted in that case. Returns [Error::Credentials] if the credentials
/// cannot be created.
pub async fn apply_google_cloud_run_auth<R>(
    client: HttpClient,
    settings: &Settings,
    resolver: &R,
) -> Result<HttpClient, Error>
where
    R: CredentialsResolver + ?Sized,
{
    if !is_google_cloud_run_auth_configured(settings) {
        return Ok(client);
    }

    let audience = &settings.google_cloud_run_audience;
    if audience.is_empty() {
        return Err(Error::MissingAudience);
    }

    let key = settings
        .google_cloud_run_service_account_key
        .as_deref()
        .filter(|k| !k.is_empty());
    let credentials = match key {
        Some(key) => {
            tracing::debug!("using the service account key from the settings for {audience}");
            resolver
                .from_service_account_key(key.as_bytes().to_vec(), audience.clone())
                .await
                .map_err(|source| Error::Credentials {
                    context: SERVICE_ACCOUNT_KEY_CONTEXT,
                    source,
                })?
        }
        None => {
            tracing::debug!("using Application Default Credentials for {audience}");
            resolver
                .from_default(audience.clone())
                .await
                .map_err(|source| Error::Credentials {
                    context: DEFAULT_CREDENTIALS_CONTEXT,
                    source,
                })?
        }
    };

    Ok(client.with_id_token(credentials))
}
