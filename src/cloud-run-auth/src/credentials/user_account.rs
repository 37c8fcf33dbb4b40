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

//! Obtain [ID tokens] for a [user account].
//!
//! Authorized user credentials are typically created by running
//! `gcloud auth application-default login`. Application Default Credentials
//! use them when the well-known file contains such a login, which is the
//! common case on developer workstations.
//!
//! The credentials exchange the refresh token at the OAuth 2.0 token
//! endpoint. The response only includes an ID token when the login was
//! performed through `gcloud`.
//!
//! ## Example
//!
//! ```no_run
//! # use cloud_run_auth::credentials::user_account;
//! # tokio_test::block_on(async {
//! let authorized_user = serde_json::json!({
//!     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
//!     "client_secret": "YOUR_CLIENT_SECRET",
//!     "refresh_token": "YOUR_REFRESH_TOKEN",
//!     "type": "authorized_user",
//! });
//! let credentials = user_account::Builder::new(authorized_user).build()?;
//! let id_token = credentials.id_token().await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [ID tokens]: https://cloud.google.com/docs/authentication/token-types#identity-tokens
//! [user account]: https://cloud.google.com/docs/authentication#user-accounts

use crate::build_errors::Error as BuilderError;
use crate::constants::OAUTH2_TOKEN_SERVER_URL;
use crate::credentials::{CachedIDTokenCredentials, IDTokenCredentials, parse_id_token_from_str};
use crate::errors::{self, CredentialsError};
use crate::token::{Token, TokenProvider};
use crate::token_cache::TokenCache;
use crate::{BuildResult, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub(crate) const AUTHORIZED_USER_TYPE: &str = "authorized_user";

/// A builder for [`IDTokenCredentials`] instances backed by user account
/// credentials.
pub struct Builder {
    authorized_user: Value,
    token_uri: Option<String>,
}

impl Builder {
    /// Creates a new builder from a JSON object with the authorized user
    /// credentials.
    ///
    /// The JSON is typically generated when a user authenticates using the
    /// [application-default login] process.
    ///
    /// [application-default login]: https://cloud.google.com/sdk/gcloud/reference/auth/application-default/login
    pub fn new(authorized_user: Value) -> Self {
        Self {
            authorized_user,
            token_uri: None,
        }
    }

    /// Sets the URI for the token endpoint.
    ///
    /// Any value provided here overrides a `token_uri` value from the input
    /// JSON. Defaults to `https://oauth2.googleapis.com/token`.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    fn build_token_provider(self) -> BuildResult<UserTokenProvider> {
        let authorized_user = serde_json::from_value::<AuthorizedUser>(self.authorized_user)
            .map_err(BuilderError::parsing)?;
        let endpoint = self
            .token_uri
            .or_else(|| authorized_user.token_uri.clone())
            .unwrap_or_else(|| OAUTH2_TOKEN_SERVER_URL.to_string());
        Ok(UserTokenProvider {
            client_id: authorized_user.client_id,
            client_secret: authorized_user.client_secret,
            refresh_token: authorized_user.refresh_token,
            endpoint,
        })
    }

    /// Returns an [`IDTokenCredentials`] instance with the configured
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the JSON provided to [`Builder::new`] is
    /// missing required fields.
    pub fn build(self) -> BuildResult<IDTokenCredentials> {
        let creds = CachedIDTokenCredentials {
            token_provider: TokenCache::new(self.build_token_provider()?),
        };
        Ok(IDTokenCredentials {
            inner: Arc::new(creds),
        })
    }
}

/// The fields of an `authorized_user` credentials file.
#[derive(Deserialize)]
pub(crate) struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

struct UserTokenProvider {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    endpoint: String,
}

impl std::fmt::Debug for UserTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTokenProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl TokenProvider for UserTokenProvider {
    async fn token(&self) -> Result<Token> {
        let client = Client::new();

        let req = Oauth2RefreshRequest {
            grant_type: RefreshGrantType::RefreshToken,
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
        };
        let response = client
            .post(&self.endpoint)
            .json(&req)
            .send()
            .await
            .map_err(|e| errors::from_http_error(e, "failed to refresh user credentials"))?;

        if !response.status().is_success() {
            return Err(
                errors::from_http_response(response, "failed to refresh user credentials").await,
            );
        }

        let response = response
            .json::<Oauth2RefreshResponse>()
            .await
            .map_err(|e| CredentialsError::new(!e.is_decode(), "cannot decode refresh response", e))?;

        match response.id_token {
            Some(id_token) => parse_id_token_from_str(id_token),
            None => Err(CredentialsError::from_msg(
                false,
                "can obtain an id token only when authenticated through gcloud",
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) enum RefreshGrantType {
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Oauth2RefreshRequest {
    pub(crate) grant_type: RefreshGrantType,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) refresh_token: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Oauth2RefreshResponse {
    pub(crate) access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) scope: Option<String>,
    pub(crate) token_type: String,
}
