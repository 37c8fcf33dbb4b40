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

use crate::credentials::IDTokenCredentials;
use crate::errors::CredentialsError;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response};
use std::future::Future;
use std::sync::Arc;

/// The errors returned when sending requests through an [HttpClient].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No ID token could be obtained. The request was not sent.
    #[error("cannot obtain an ID token for the request")]
    Credentials(#[source] CredentialsError),
    /// Building or sending the request failed.
    #[error("the HTTP request failed")]
    Http(#[from] reqwest::Error),
    /// The token cannot be used as a header value.
    #[error("the ID token is not a valid header value")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

/// Sends a single HTTP request and returns its response.
///
/// Implementations may change the request before sending it, for example to
/// add headers, and then hand it to another transport.
pub trait Transport: std::fmt::Debug + Send + Sync + 'static {
    /// Sends `request`.
    fn execute(&self, request: Request) -> impl Future<Output = Result<Response, Error>> + Send;
}

pub(crate) mod dynamic {
    use super::Error;
    use reqwest::{Request, Response};
    use std::any::Any;

    /// A dyn-compatible, crate-private version of `Transport`.
    #[async_trait::async_trait]
    pub trait Transport: Send + Sync + std::fmt::Debug {
        async fn execute(&self, request: Request) -> Result<Response, Error>;

        fn as_any(&self) -> &dyn Any;
    }

    #[async_trait::async_trait]
    impl<T> Transport for T
    where
        T: super::Transport,
    {
        async fn execute(&self, request: Request) -> Result<Response, Error> {
            T::execute(self, request).await
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }
}

/// Sends requests with a `reqwest::Client`, unchanged.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        Ok(self.client.execute(request).await?)
    }
}

/// A transport that sets `Authorization: Bearer <id token>` on every request.
///
/// The token is fetched from the credentials before each request. The
/// credentials cache tokens, so this is usually cheap. Any existing
/// `Authorization` header is replaced.
#[derive(Clone, Debug)]
pub struct IdTokenTransport {
    base: Arc<dyn dynamic::Transport>,
    credentials: IDTokenCredentials,
}

impl IdTokenTransport {
    /// Wraps `base`, attaching tokens from `credentials`.
    pub fn new<T: Transport>(base: T, credentials: IDTokenCredentials) -> Self {
        Self {
            base: Arc::new(base),
            credentials,
        }
    }

    /// Returns `true` if this transport forwards requests to the transport of
    /// `client`.
    pub fn wraps(&self, client: &HttpClient) -> bool {
        Arc::ptr_eq(&self.base, &client.transport)
    }
}

impl Transport for IdTokenTransport {
    async fn execute(&self, mut request: Request) -> Result<Response, Error> {
        let token = self
            .credentials
            .id_token()
            .await
            .map_err(Error::Credentials)?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.base.execute(request).await
    }
}

/// An HTTP client whose transport can be decorated.
///
/// Requests are built with the wrapped `reqwest::Client`, and sent through
/// the transport. Clones share the transport.
///
/// # Example
/// ```no_run
/// # use cloud_run_auth::HttpClient;
/// # tokio_test::block_on(async {
/// let client = HttpClient::new(reqwest::Client::new());
/// let response = client.send(client.get("https://example.com")).await?;
/// # Ok::<(), anyhow::Error>(())
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    transport: Arc<dyn dynamic::Transport>,
}

impl HttpClient {
    /// Creates a client that sends requests with `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new(client.clone())),
            client,
        }
    }

    /// Replaces the transport.
    pub fn with_transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Returns a client that attaches ID tokens from `credentials` to every
    /// request, and then sends it through the current transport.
    pub fn with_id_token(self, credentials: IDTokenCredentials) -> Self {
        let transport = IdTokenTransport {
            base: self.transport.clone(),
            credentials,
        };
        self.with_transport(transport)
    }

    /// Starts a request with the given method and URL.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Starts a `GET` request.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.get(url)
    }

    /// Starts a `POST` request.
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.client.post(url)
    }

    /// Builds and sends a request through the transport.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        self.execute(request.build()?).await
    }

    /// Sends a request through the transport.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        self.transport.execute(request).await
    }

    /// Returns the transport if it is a `T`.
    pub fn transport<T: Transport>(&self) -> Option<&T> {
        self.transport.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if both clients share the same transport.
    pub fn ptr_eq(&self, other: &HttpClient) -> bool {
        Arc::ptr_eq(&self.transport, &other.transport)
    }
}
