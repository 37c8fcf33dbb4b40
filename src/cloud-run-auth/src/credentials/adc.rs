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

//! Find ID token credentials using [Application Default Credentials].
//!
//! The credentials are loaded from the first of these sources that is
//! present:
//!
//! 1. The file named by the `GOOGLE_APPLICATION_CREDENTIALS` environment
//!    variable. An unreadable file is an error, the search stops there.
//! 2. The `gcloud` well-known file, created by
//!    `gcloud auth application-default login`.
//! 3. The metadata service, if it answers within the probe timeout.
//!
//! Credential files may contain a `service_account` key or an
//! `authorized_user` login. Other credential types cannot produce ID tokens
//! with this crate.
//!
//! # Example
//! ```no_run
//! # use cloud_run_auth::credentials::adc;
//! # tokio_test::block_on(async {
//! let credentials = adc::Builder::new("https://my-service-abc123.a.run.app")
//!     .build()
//!     .await?;
//! let id_token = credentials.id_token().await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

use crate::BuildResult;
use crate::build_errors::Error as BuilderError;
use crate::constants::GOOGLE_APPLICATION_CREDENTIALS_VAR;
use crate::credentials::service_account::SERVICE_ACCOUNT_TYPE;
use crate::credentials::user_account::AUTHORIZED_USER_TYPE;
use crate::credentials::{IDTokenCredentials, mds, service_account, user_account};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const USER_CREDENTIAL_FILE: &str = "application_default_credentials.json";

#[derive(Debug, PartialEq)]
enum AdcPath {
    FromEnv(String),
    WellKnown(String),
}

/// Creates [`IDTokenCredentials`] from the environment.
pub struct Builder {
    target_audience: String,
    metadata_endpoint: Option<String>,
    probe_timeout: Duration,
}

impl Builder {
    /// The `target_audience` is the intended audience of the ID tokens,
    /// typically the URL of the receiving service.
    pub fn new<S: Into<String>>(target_audience: S) -> Self {
        Self {
            target_audience: target_audience.into(),
            metadata_endpoint: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Sets the metadata service endpoint used when no credentials file is
    /// found.
    ///
    /// The `GCE_METADATA_HOST` environment variable takes precedence.
    pub fn with_metadata_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.metadata_endpoint = Some(endpoint.into());
        self
    }

    /// How long to wait for the metadata service to answer. Defaults to 3
    /// seconds.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Searches the environment and returns the first credentials found.
    ///
    /// # Errors
    ///
    /// Returns a loading error if the credentials file cannot be read, or if
    /// no source is available. Returns a parsing error for malformed files,
    /// and a not-supported error for credential types that cannot produce ID
    /// tokens.
    pub async fn build(self) -> BuildResult<IDTokenCredentials> {
        if self.target_audience.is_empty() {
            return Err(BuilderError::missing_field("target_audience"));
        }

        if let Some(json) = load_adc().await? {
            return build_from_json(self.target_audience, json);
        }

        let endpoint = mds::resolve_endpoint(self.metadata_endpoint);
        if mds::is_available(&endpoint, self.probe_timeout).await {
            tracing::debug!("using metadata service at {endpoint} for ID tokens");
            return mds::Builder::new(self.target_audience)
                .with_endpoint(endpoint)
                .build();
        }

        tracing::warn!("metadata service at {endpoint} did not answer");
        Err(BuilderError::loading(
            "no default credentials were found, set GOOGLE_APPLICATION_CREDENTIALS, \
             run `gcloud auth application-default login`, or run on Google Cloud",
        ))
    }
}

fn build_from_json(target_audience: String, json: Value) -> BuildResult<IDTokenCredentials> {
    let cred_type = json
        .get("type")
        .ok_or_else(|| BuilderError::parsing("no `type` field found"))?
        .as_str()
        .ok_or_else(|| BuilderError::parsing("the `type` field is not a string"))?;
    match cred_type {
        SERVICE_ACCOUNT_TYPE => service_account::Builder::new(target_audience, json).build(),
        AUTHORIZED_USER_TYPE => user_account::Builder::new(json).build(),
        other => Err(BuilderError::not_supported(format!(
            "`{other}` credentials cannot produce ID tokens"
        ))),
    }
}

async fn load_adc() -> BuildResult<Option<Value>> {
    let path = match adc_path() {
        Some(p) => p,
        None => return Ok(None),
    };
    let (path, contents) = match path {
        AdcPath::FromEnv(path) => match tokio::fs::read_to_string(&path).await {
            Ok(contents) => (path, contents),
            Err(e) => {
                return Err(BuilderError::loading(format!(
                    "failed to load Application Default Credentials from {path:?}, \
                     named by {GOOGLE_APPLICATION_CREDENTIALS_VAR}: {e}"
                )));
            }
        },
        AdcPath::WellKnown(path) => match tokio::fs::read_to_string(&path).await {
            Ok(contents) => (path, contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BuilderError::loading(format!(
                    "failed to load Application Default Credentials from {path:?}: {e}"
                )));
            }
        },
    };
    tracing::debug!("loading Application Default Credentials from {path}");
    let json = serde_json::from_str(&contents).map_err(BuilderError::parsing)?;
    Ok(Some(json))
}

fn adc_path() -> Option<AdcPath> {
    if let Ok(path) = std::env::var(GOOGLE_APPLICATION_CREDENTIALS_VAR) {
        return Some(AdcPath::FromEnv(path));
    }
    Some(AdcPath::WellKnown(adc_well_known_path()?))
}

/// The path of the file written by `gcloud auth application-default login`.
#[cfg(target_os = "windows")]
fn adc_well_known_path() -> Option<String> {
    std::env::var("APPDATA").ok().map(|root| {
        PathBuf::from(root)
            .join("gcloud")
            .join(USER_CREDENTIAL_FILE)
            .to_string_lossy()
            .into_owned()
    })
}

/// The path of the file written by `gcloud auth application-default login`.
#[cfg(not(target_os = "windows"))]
fn adc_well_known_path() -> Option<String> {
    std::env::var("HOME").ok().map(|root| {
        PathBuf::from(root)
            .join(".config")
            .join("gcloud")
            .join(USER_CREDENTIAL_FILE)
            .to_string_lossy()
            .into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{GCE_METADATA_HOST_ENV_VAR, MDS_DEFAULT_URI, METADATA_FLAVOR};
    use crate::credentials::tests::{PKCS8_PK, generate_test_id_token};
    use httptest::matchers::{all_of, contains, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use scoped_env::ScopedEnv;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    type TestResult = anyhow::Result<()>;

    fn write_cred_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    // An address with nothing listening on it.
    fn unreachable_endpoint() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        format!("http://{addr}")
    }

    #[test]
    #[serial]
    fn adc_path_env_var_wins() {
        let _creds = ScopedEnv::set(GOOGLE_APPLICATION_CREDENTIALS_VAR, "/usr/bin/creds.json");
        let _home = ScopedEnv::set("HOME", "/home/foo");
        assert_eq!(
            adc_path(),
            Some(AdcPath::FromEnv("/usr/bin/creds.json".to_string()))
        );
    }

    #[test]
    #[serial]
    #[cfg_attr(target_os = "windows", ignore)]
    fn adc_path_well_known() {
        let _creds = ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS_VAR);
        let _home = ScopedEnv::set("HOME", "/home/foo");
        assert_eq!(
            adc_path(),
            Some(AdcPath::WellKnown(
                "/home/foo/.config/gcloud/application_default_credentials.json".to_string()
            ))
        );
    }

    #[test]
    #[serial]
    #[cfg_attr(target_os = "windows", ignore)]
    fn adc_path_without_home() {
        let _creds = ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS_VAR);
        let _home = ScopedEnv::remove("HOME");
        assert_eq!(adc_path(), None);
    }

    #[tokio::test]
    #[serial]
    async fn empty_audience() {
        let err = Builder::new("").build().await.unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
    }

    #[tokio::test]
    #[serial]
    async fn env_var_file_missing() {
        let _e = ScopedEnv::set(GOOGLE_APPLICATION_CREDENTIALS_VAR, "file-does-not-exist.json");
        let err = Builder::new("test-audience").build().await.unwrap_err();
        assert!(err.is_loading(), "{err:?}");
        let msg = err.to_string();
        assert!(msg.contains("file-does-not-exist.json"), "{msg}");
        assert!(msg.contains(GOOGLE_APPLICATION_CREDENTIALS_VAR), "{msg}");
    }

    #[tokio::test]
    #[serial]
    async fn malformed_files() {
        for contents in ["not json", "{}", r#"{"type": 42}"#] {
            let file = write_cred_json(contents);
            let _e = ScopedEnv::set(
                GOOGLE_APPLICATION_CREDENTIALS_VAR,
                file.path().to_str().unwrap(),
            );
            let err = Builder::new("test-audience").build().await.unwrap_err();
            assert!(err.is_parsing(), "{contents}: {err:?}");
        }
    }

    #[tokio::test]
    #[serial]
    async fn unsupported_type() {
        let file = write_cred_json(r#"{"type": "external_account"}"#);
        let _e = ScopedEnv::set(
            GOOGLE_APPLICATION_CREDENTIALS_VAR,
            file.path().to_str().unwrap(),
        );
        let err = Builder::new("test-audience").build().await.unwrap_err();
        assert!(err.is_not_supported(), "{err:?}");
        assert!(err.to_string().contains("external_account"), "{err}");
    }

    #[tokio::test]
    #[serial]
    async fn service_account_from_env_var() -> TestResult {
        let id_token = generate_test_id_token("test-audience");
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![request::method("POST"), request::path("/token")])
                .respond_with(json_encoded(serde_json::json!({"id_token": id_token}))),
        );

        let contents = serde_json::json!({
            "type": "service_account",
            "client_email": "test-client-email",
            "private_key_id": "test-private-key-id",
            "private_key": PKCS8_PK.clone(),
            "project_id": "test-project-id",
            "token_uri": server.url("/token").to_string(),
        });
        let file = write_cred_json(&contents.to_string());
        let _e = ScopedEnv::set(
            GOOGLE_APPLICATION_CREDENTIALS_VAR,
            file.path().to_str().unwrap(),
        );

        let creds = Builder::new("test-audience").build().await?;
        assert_eq!(creds.id_token().await?, id_token);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    #[cfg_attr(target_os = "windows", ignore)]
    async fn authorized_user_from_well_known_file() -> TestResult {
        let id_token = generate_test_id_token("test-audience");
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![request::method("POST"), request::path("/token")])
                .respond_with(json_encoded(serde_json::json!({
                    "access_token": "test-access-token",
                    "id_token": id_token,
                    "token_type": "Bearer",
                }))),
        );

        let home = tempfile::tempdir()?;
        let gcloud = home.path().join(".config").join("gcloud");
        std::fs::create_dir_all(&gcloud)?;
        let contents = serde_json::json!({
            "type": "authorized_user",
            "client_id": "test-client-id",
            "client_secret": "test-client-secret",
            "refresh_token": "test-refresh-token",
            "token_uri": server.url("/token").to_string(),
        });
        std::fs::write(gcloud.join(USER_CREDENTIAL_FILE), contents.to_string())?;

        let _creds = ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS_VAR);
        let _home = ScopedEnv::set("HOME", home.path().to_str().unwrap());

        let creds = Builder::new("test-audience").build().await?;
        assert_eq!(creds.id_token().await?, id_token);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn falls_back_to_metadata_service() -> TestResult {
        let audience = "test-audience";
        let id_token = generate_test_id_token(audience);
        let server = Server::run();
        server.expect(
            Expectation::matching(request::path("/"))
                .respond_with(status_code(200).insert_header(METADATA_FLAVOR, "Google")),
        );
        server.expect(
            Expectation::matching(all_of![
                request::path(format!("{MDS_DEFAULT_URI}/identity")),
                request::query(url_decoded(contains(("audience", audience)))),
            ])
            .respond_with(status_code(200).body(id_token.clone())),
        );

        let home = tempfile::tempdir()?;
        let _creds = ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS_VAR);
        let _mds = ScopedEnv::remove(GCE_METADATA_HOST_ENV_VAR);
        let _home = ScopedEnv::set("HOME", home.path().to_str().unwrap());
        let _appdata = ScopedEnv::set("APPDATA", home.path().to_str().unwrap());

        let creds = Builder::new(audience)
            .with_metadata_endpoint(format!("http://{}", server.addr()))
            .build()
            .await?;
        assert_eq!(creds.id_token().await?, id_token);
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn nothing_found() -> TestResult {
        let home = tempfile::tempdir()?;
        let _creds = ScopedEnv::remove(GOOGLE_APPLICATION_CREDENTIALS_VAR);
        let _mds = ScopedEnv::remove(GCE_METADATA_HOST_ENV_VAR);
        let _home = ScopedEnv::set("HOME", home.path().to_str().unwrap());
        let _appdata = ScopedEnv::set("APPDATA", home.path().to_str().unwrap());

        let err = Builder::new("test-audience")
            .with_metadata_endpoint(unreachable_endpoint())
            .with_probe_timeout(Duration::from_millis(500))
            .build()
            .await
            .unwrap_err();
        assert!(err.is_loading(), "{err:?}");
        assert!(err.to_string().contains("no default credentials"), "{err}");
        Ok(())
    }
}
