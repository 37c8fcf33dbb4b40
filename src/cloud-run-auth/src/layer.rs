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
use crate::transport::Error;
use futures::future::BoxFuture;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};

/// A Tower layer that sets `Authorization: Bearer <id token>` on requests.
///
/// This is the `tower` counterpart of [IdTokenTransport], for applications
/// that send `http::Request`s through a service stack.
///
/// [IdTokenTransport]: crate::transport::IdTokenTransport
#[derive(Clone, Debug)]
pub struct IdTokenLayer {
    credentials: IDTokenCredentials,
}

impl IdTokenLayer {
    pub fn new(credentials: IDTokenCredentials) -> Self {
        Self { credentials }
    }
}

impl<S> Layer<S> for IdTokenLayer {
    type Service = IdTokenService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdTokenService {
            inner,
            credentials: self.credentials.clone(),
        }
    }
}

/// The service created by [IdTokenLayer].
///
/// Failures to obtain a token are returned as [Error::Credentials], and the
/// inner service is not called.
#[derive(Clone, Debug)]
pub struct IdTokenService<S> {
    inner: S,
    credentials: IDTokenCredentials,
}

impl<S, B> Service<http::Request<B>> for IdTokenService<S>
where
    S: Service<http::Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // The clone is not ready, keep the ready service for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let credentials = self.credentials.clone();
        Box::pin(async move {
            let token = credentials.id_token().await.map_err(Error::Credentials)?;
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(Error::from)?;
            value.set_sensitive(true);
            req.headers_mut().insert(AUTHORIZATION, value);
            inner.call(req).await.map_err(Into::into)
        })
    }
}
