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

//! Cloud Run authentication for HTTP clients.
//!
//! Services hosted in [Cloud Run] (or behind Identity-Aware Proxy) that
//! require authentication expect an [OIDC ID token] in the `Authorization`
//! header, scoped to the service URL. This crate decorates an HTTP client so
//! every outgoing request carries such a token.
//!
//! The token comes from one of two places:
//!
//! * a [service account key] supplied in the data source settings, or
//! * [Application Default Credentials], discovered from the environment the
//!   process runs in (a key file, a `gcloud` login, or the metadata server).
//!
//! # Example
//!
//! ```no_run
//! # use cloud_run_auth::{apply_google_cloud_run_auth, DefaultResolver, HttpClient};
//! # use cloud_run_auth::settings::{AuthenticationMethod, Settings};
//! # tokio_test::block_on(async {
//! let settings = Settings {
//!     auth_method: AuthenticationMethod::GoogleCloudRun,
//!     google_cloud_run_audience: "https://my-service-abc123.a.run.app".to_string(),
//!     google_cloud_run_service_account_key: None,
//! };
//! let client = HttpClient::new(reqwest::Client::new());
//! let client = apply_google_cloud_run_auth(client, &settings, &DefaultResolver::default()).await?;
//! let response = client
//!     .send(client.get("https://my-service-abc123.a.run.app/api/items"))
//!     .await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [Cloud Run]: https://cloud.google.com/run
//! [OIDC ID token]: https://cloud.google.com/docs/authentication/token-types#identity-tokens
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

pub mod build_errors;
pub mod errors;

/// Decide whether Cloud Run authentication applies and decorate clients.
pub mod cloud_run;

/// Types and functions to obtain [ID tokens].
///
/// [ID tokens]: https://cloud.google.com/docs/authentication/token-types#identity-tokens
pub mod credentials;

/// A [tower] layer that attaches ID tokens to `http::Request`s.
pub mod layer;

/// Data source settings consumed by this crate.
pub mod settings;

/// Types and functions to work with auth tokens.
pub mod token;

/// HTTP clients with replaceable transports.
pub mod transport;

pub(crate) mod constants;
pub(crate) mod token_cache;

pub use cloud_run::{
    CredentialsResolver, DefaultResolver, apply_google_cloud_run_auth,
    is_google_cloud_run_auth_configured,
};
pub use layer::IdTokenLayer;
pub use transport::{HttpClient, IdTokenTransport};

/// A `Result` alias where the `Err` case is
/// `cloud_run_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

/// A `Result` alias where the `Err` case is `cloud_run_auth::build_errors::Error`.
pub type BuildResult<T> = std::result::Result<T, build_errors::Error>;
