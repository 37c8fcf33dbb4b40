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
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// The key of the service account key in the secure settings map.
pub const SERVICE_ACCOUNT_KEY_SECURE_FIELD: &str = "googleCloudRunServiceAccountKey";

/// How the data source authenticates its outgoing requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthenticationMethod {
    /// No authentication.
    #[default]
    None,
    BasicAuth,
    BearerToken,
    ApiKey,
    DigestAuth,
    /// Forward the user's OAuth identity.
    OAuthPassThru,
    OAuth2,
    Aws,
    AzureBlob,
    /// Attach Google-issued ID tokens for a Cloud Run audience.
    GoogleCloudRun,
    /// Use this variant to handle new values that are not yet known to this library.
    UnknownValue(String),
}

impl AuthenticationMethod {
    /// The name used in the data source JSON.
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::BasicAuth => "basicAuth",
            Self::BearerToken => "bearerToken",
            Self::ApiKey => "apiKey",
            Self::DigestAuth => "digestAuth",
            Self::OAuthPassThru => "oauthPassThru",
            Self::OAuth2 => "oauth2",
            Self::Aws => "aws",
            Self::AzureBlob => "azureBlob",
            Self::GoogleCloudRun => "googleCloudRun",
            Self::UnknownValue(v) => v.as_str(),
        }
    }
}

impl From<&str> for AuthenticationMethod {
    fn from(value: &str) -> Self {
        match value {
            "" | "none" => Self::None,
            "basicAuth" => Self::BasicAuth,
            "bearerToken" => Self::BearerToken,
            "apiKey" => Self::ApiKey,
            "digestAuth" => Self::DigestAuth,
            "oauthPassThru" => Self::OAuthPassThru,
            "oauth2" => Self::OAuth2,
            "aws" => Self::Aws,
            "azureBlob" => Self::AzureBlob,
            "googleCloudRun" => Self::GoogleCloudRun,
            other => Self::UnknownValue(other.to_string()),
        }
    }
}

impl std::fmt::Display for AuthenticationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuthenticationMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthenticationMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value.as_str()))
    }
}

/// The data source settings used to decorate HTTP clients.
///
/// Settings are read once per client construction and never modified.
#[derive(Clone, Default, PartialEq)]
pub struct Settings {
    /// The selected authentication method.
    pub auth_method: AuthenticationMethod,
    /// The audience of the ID tokens, typically the Cloud Run service URL.
    pub google_cloud_run_audience: String,
    /// A JSON service account key. When `None`, credentials are discovered
    /// from the environment.
    pub google_cloud_run_service_account_key: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("auth_method", &self.auth_method)
            .field("google_cloud_run_audience", &self.google_cloud_run_audience)
            .field(
                "google_cloud_run_service_account_key",
                &self
                    .google_cloud_run_service_account_key
                    .as_ref()
                    .map(|_| "[censored]"),
            )
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PluginJson {
    #[serde(default, rename = "authenticationMethod")]
    auth_method: AuthenticationMethod,
    #[serde(default)]
    google_cloud_run_audience: String,
}

impl Settings {
    /// Loads the settings from the data source's JSON and its decrypted
    /// secure fields.
    ///
    /// Surrounding whitespace in the audience is dropped. An empty service
    /// account key is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if `json` is not a valid settings object.
    pub fn from_plugin_json(
        json: &[u8],
        secure: &HashMap<String, String>,
    ) -> BuildResult<Settings> {
        let plugin = serde_json::from_slice::<PluginJson>(json).map_err(BuilderError::parsing)?;
        let key = secure
            .get(SERVICE_ACCOUNT_KEY_SECURE_FIELD)
            .filter(|k| !k.trim().is_empty())
            .cloned();
        Ok(Settings {
            auth_method: plugin.auth_method,
            google_cloud_run_audience: plugin.google_cloud_run_audience.trim().to_string(),
            google_cloud_run_service_account_key: key,
        })
    }
}
