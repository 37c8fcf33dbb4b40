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

//! Obtain [OIDC ID tokens] using the [Metadata Service].
//!
//! Google Cloud environments such as [Google Compute Engine (GCE)][gce-link],
//! [Google Kubernetes Engine (GKE)][gke-link], or [Cloud Run] provide a
//! metadata service. This is a local service to the VM (or pod) which, among
//! other things, issues ID tokens for the [default service account] of the
//! workload.
//!
//! The default host name of the metadata service is `metadata.google.internal`.
//! If you would like to use a different hostname, you can set it using the
//! `GCE_METADATA_HOST` environment variable.
//!
//! ## Example
//!
//! ```no_run
//! # use cloud_run_auth::credentials::mds;
//! # tokio_test::block_on(async {
//! let audience = "https://my-service-abc123.a.run.app";
//! let credentials = mds::Builder::new(audience)
//!     .with_format(mds::Format::Full)
//!     .build()?;
//! let id_token = credentials.id_token().await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [OIDC ID tokens]: https://cloud.google.com/docs/authentication/token-types#identity-tokens
//! [Cloud Run]: https://cloud.google.com/run
//! [default service account]: https://cloud.google.com/iam/docs/service-account-types#default
//! [gce-link]: https://cloud.google.com/products/compute
//! [gke-link]: https://cloud.google.com/kubernetes-engine
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use crate::build_errors::Error as BuilderError;
use crate::constants::{
    GCE_METADATA_HOST_ENV_VAR, MDS_DEFAULT_URI, METADATA_FLAVOR, METADATA_FLAVOR_VALUE,
    METADATA_ROOT,
};
use crate::credentials::{CachedIDTokenCredentials, IDTokenCredentials, parse_id_token_from_str};
use crate::errors::{self, CredentialsError};
use crate::token::{Token, TokenProvider};
use crate::token_cache::TokenCache;
use crate::{BuildResult, Result};
use async_trait::async_trait;
use http::HeaderValue;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Specifies what assertions are included in ID Tokens fetched from the
/// Metadata Service.
#[derive(Debug, Clone, PartialEq)]
pub enum Format {
    /// Omit project and instance details from the payload. It's the default value.
    Standard,
    /// Include project and instance details in the payload.
    Full,
    /// Use this variant to handle new values that are not yet known to this library.
    UnknownValue(String),
}

impl Format {
    fn as_str(&self) -> &str {
        match self {
            Format::Standard => "standard",
            Format::Full => "full",
            Format::UnknownValue(value) => value.as_str(),
        }
    }
}

/// Creates [`IDTokenCredentials`] instances that fetch ID tokens from the
/// metadata service.
pub struct Builder {
    endpoint: Option<String>,
    format: Option<Format>,
    licenses: Option<String>,
    target_audience: String,
}

impl Builder {
    /// Creates a new `Builder`.
    ///
    /// The `target_audience` is a required parameter that specifies the
    /// intended audience of the ID token. This is typically the URL of the
    /// service that will be receiving the token.
    pub fn new<S: Into<String>>(target_audience: S) -> Self {
        Builder {
            endpoint: None,
            format: None,
            licenses: None,
            target_audience: target_audience.into(),
        }
    }

    /// Sets the endpoint for this credentials.
    ///
    /// Specify the base URL without a trailing slash. If not set, the
    /// credentials use `http://metadata.google.internal`. The
    /// `GCE_METADATA_HOST` environment variable takes precedence over this
    /// value.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the [format] of the token.
    ///
    /// [format]: https://cloud.google.com/compute/docs/instances/verifying-instance-identity#token_format
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Whether to include the [license codes] of the instance in the token.
    ///
    /// Has no effect unless the format is [Format::Full].
    ///
    /// [license codes]: https://cloud.google.com/compute/docs/reference/rest/v1/images/get#body.Image.FIELDS.license_code
    pub fn with_licenses(mut self, licenses: bool) -> Self {
        self.licenses = Some(if licenses { "TRUE" } else { "FALSE" }.to_string());
        self
    }

    fn build_token_provider(self) -> BuildResult<MDSTokenProvider> {
        if self.target_audience.is_empty() {
            return Err(BuilderError::missing_field("target_audience"));
        }
        Ok(MDSTokenProvider {
            endpoint: resolve_endpoint(self.endpoint),
            format: self.format,
            licenses: self.licenses,
            target_audience: self.target_audience,
        })
    }

    /// Returns an [`IDTokenCredentials`] instance with the configured
    /// settings.
    pub fn build(self) -> BuildResult<IDTokenCredentials> {
        let creds = CachedIDTokenCredentials {
            token_provider: TokenCache::new(self.build_token_provider()?),
        };
        Ok(IDTokenCredentials {
            inner: Arc::new(creds),
        })
    }
}

/// Returns the metadata service root, honoring `GCE_METADATA_HOST`.
pub(crate) fn resolve_endpoint(endpoint: Option<String>) -> String {
    if let Ok(host) = std::env::var(GCE_METADATA_HOST_ENV_VAR) {
        return format!("http://{host}");
    }
    endpoint.unwrap_or_else(|| METADATA_ROOT.to_string())
}

/// Returns `true` if the metadata service at `endpoint` answers within
/// `timeout`.
///
/// Any HTTP server could answer on that address, so the response must carry
/// the `Metadata-Flavor: Google` header.
pub(crate) async fn is_available(endpoint: &str, timeout: Duration) -> bool {
    let response = Client::new()
        .get(endpoint)
        .header(
            METADATA_FLAVOR,
            HeaderValue::from_static(METADATA_FLAVOR_VALUE),
        )
        .timeout(timeout)
        .send()
        .await;
    match response {
        Ok(r) => r
            .headers()
            .get(METADATA_FLAVOR)
            .is_some_and(|v| v == METADATA_FLAVOR_VALUE),
        Err(e) => {
            tracing::debug!("metadata service at {endpoint} is not available: {e}");
            false
        }
    }
}

#[derive(Debug, Clone)]
struct MDSTokenProvider {
    endpoint: String,
    format: Option<Format>,
    licenses: Option<String>,
    target_audience: String,
}

#[async_trait]
impl TokenProvider for MDSTokenProvider {
    async fn token(&self) -> Result<Token> {
        let client = Client::new();
        let request = client
            .get(format!("{}{}/identity", self.endpoint, MDS_DEFAULT_URI))
            .header(
                METADATA_FLAVOR,
                HeaderValue::from_static(METADATA_FLAVOR_VALUE),
            )
            .query(&[("audience", self.target_audience.as_str())]);

        let request = self.format.iter().fold(request, |builder, format| {
            builder.query(&[("format", format.as_str())])
        });
        let request = self.licenses.iter().fold(request, |builder, licenses| {
            builder.query(&[("licenses", licenses)])
        });

        let response = request
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, "failed to fetch token"))?;

        if !response.status().is_success() {
            return Err(errors::from_http_response(response, "failed to fetch token").await);
        }

        let token = response
            .text()
            .await
            .map_err(|e| CredentialsError::from_source(!e.is_decode(), e))?;

        parse_id_token_from_str(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::{find_source_error, generate_test_id_token};
    use httptest::matchers::{all_of, contains, key, not, request, url_decoded};
    use httptest::responders::status_code;
    use httptest::{Expectation, Server};
    use reqwest::StatusCode;
    use scoped_env::ScopedEnv;
    use serial_test::{parallel, serial};
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    #[test_case(Format::Standard)]
    #[test_case(Format::Full)]
    #[test_case(Format::UnknownValue("minimal".to_string()))]
    #[tokio::test]
    #[parallel]
    async fn builder_with_format(format: Format) -> TestResult {
        let server = Server::run();
        let audience = "test-audience";
        let token_string = generate_test_id_token(audience);
        let format_str = format.as_str().to_string();
        server.expect(
            Expectation::matching(all_of![
                request::method("GET"),
                request::path(format!("{MDS_DEFAULT_URI}/identity")),
                request::headers(contains((METADATA_FLAVOR, METADATA_FLAVOR_VALUE))),
                request::query(url_decoded(contains(("audience", audience)))),
                request::query(url_decoded(contains(("format", format_str)))),
                request::query(url_decoded(contains(("licenses", "TRUE")))),
            ])
            .respond_with(status_code(200).body(token_string.clone())),
        );

        let creds = Builder::new(audience)
            .with_endpoint(format!("http://{}", server.addr()))
            .with_format(format)
            .with_licenses(true)
            .build()?;

        let id_token = creds.id_token().await?;
        assert_eq!(id_token, token_string);
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn default_query_parameters() -> TestResult {
        let server = Server::run();
        let audience = "test-audience";
        let token_string = generate_test_id_token(audience);
        server.expect(
            Expectation::matching(all_of![
                request::path(format!("{MDS_DEFAULT_URI}/identity")),
                request::query(url_decoded(contains(("audience", audience)))),
                request::query(url_decoded(not(contains(key("format"))))),
                request::query(url_decoded(not(contains(key("licenses"))))),
            ])
            .respond_with(status_code(200).body(token_string.clone())),
        );

        let creds = Builder::new(audience)
            .with_endpoint(format!("http://{}", server.addr()))
            .build()?;
        assert_eq!(creds.id_token().await?, token_string);
        Ok(())
    }

    #[test]
    #[parallel]
    fn builder_empty_audience() {
        let err = Builder::new("").build().unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
    }

    #[tokio::test]
    #[serial]
    async fn builder_with_env_var() -> TestResult {
        let server = Server::run();
        let audience = "test-audience";
        let token_string = generate_test_id_token(audience);
        server.expect(
            Expectation::matching(all_of![
                request::path(format!("{MDS_DEFAULT_URI}/identity")),
                request::query(url_decoded(contains(("audience", audience))))
            ])
            .respond_with(status_code(200).body(token_string.clone())),
        );

        let addr = server.addr().to_string();
        let _e = ScopedEnv::set(GCE_METADATA_HOST_ENV_VAR, &addr);

        let creds = Builder::new(audience)
            .with_endpoint("http://ignored.invalid")
            .build()?;

        let id_token = creds.id_token().await?;
        assert_eq!(id_token, token_string);
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn provider_http_error() -> TestResult {
        let server = Server::run();
        let audience = "test-audience";
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/identity")))
                .respond_with(status_code(503)),
        );

        let creds = Builder::new(audience)
            .with_endpoint(format!("http://{}", server.addr()))
            .build()?;

        let err = creds.id_token().await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        let source = find_source_error::<reqwest::Error>(&err);
        assert!(
            matches!(source, Some(e) if e.status() == Some(StatusCode::SERVICE_UNAVAILABLE)),
            "{err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn provider_caching() -> TestResult {
        let server = Server::run();
        let audience = "test-audience";
        let token_string = generate_test_id_token(audience);
        server.expect(
            Expectation::matching(request::path(format!("{MDS_DEFAULT_URI}/identity")))
                .times(1)
                .respond_with(status_code(200).body(token_string.clone())),
        );

        let creds = Builder::new(audience)
            .with_endpoint(format!("http://{}", server.addr()))
            .build()?;

        assert_eq!(creds.id_token().await?, token_string);
        assert_eq!(creds.id_token().await?, token_string);
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn available_with_flavor_header() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method("GET"),
                request::path("/"),
                request::headers(contains((METADATA_FLAVOR, METADATA_FLAVOR_VALUE))),
            ])
            .respond_with(status_code(200).insert_header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)),
        );
        let endpoint = format!("http://{}", server.addr());
        assert!(is_available(&endpoint, Duration::from_secs(3)).await);
    }

    #[tokio::test]
    #[parallel]
    async fn unavailable_without_flavor_header() {
        let server = Server::run();
        server.expect(Expectation::matching(request::path("/")).respond_with(status_code(200)));
        let endpoint = format!("http://{}", server.addr());
        assert!(!is_available(&endpoint, Duration::from_secs(3)).await);
    }

    #[tokio::test]
    #[parallel]
    async fn unavailable_when_unreachable() {
        // Bind and drop a listener to find a port with nothing behind it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let endpoint = format!("http://{addr}");
        assert!(!is_available(&endpoint, Duration::from_secs(1)).await);
    }
}
