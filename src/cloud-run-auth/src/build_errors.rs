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

//! Errors returned while creating ID token credentials.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why the ID token credentials for a Cloud Run audience could not be
/// created.
///
/// The builders in [crate::credentials] return this error, and so do
/// [CredentialsResolver] implementations. Tests that mock a resolver create
/// instances with the constructors below.
///
/// [CredentialsResolver]: crate::cloud_run::CredentialsResolver
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The credentials file could not be read, or the environment has no
    /// credentials at all.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// The service account key or credentials file is not valid JSON, or is
    /// missing the fields its type requires.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_))
    }

    /// A service account key declares some other credentials type.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.0, ErrorKind::UnknownType(_))
    }

    /// A builder was given an empty value, usually the audience.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// The credentials file holds a type that cannot mint ID tokens.
    pub fn is_not_supported(&self) -> bool {
        matches!(self.0, ErrorKind::NotSupported(_))
    }

    pub fn loading<T: Into<BoxError>>(source: T) -> Error {
        Error(ErrorKind::Loading(source.into()))
    }

    pub fn parsing<T: Into<BoxError>>(source: T) -> Error {
        Error(ErrorKind::Parsing(source.into()))
    }

    pub fn unknown_type<T: Into<BoxError>>(source: T) -> Error {
        Error(ErrorKind::UnknownType(source.into()))
    }

    pub fn missing_field(field: &'static str) -> Error {
        Error(ErrorKind::MissingField(field))
    }

    pub fn not_supported<T: Into<BoxError>>(credentials_type: T) -> Error {
        Error(ErrorKind::NotSupported(credentials_type.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("cannot load ID token credentials: {0}")]
    Loading(#[source] BoxError),
    #[error("invalid credentials JSON: {0}")]
    Parsing(#[source] BoxError),
    #[error("expected a service account key: {0}")]
    UnknownType(#[source] BoxError),
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("cannot create ID tokens with {0} credentials")]
    NotSupported(#[source] BoxError),
}
