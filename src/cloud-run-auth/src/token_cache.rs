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

use crate::Result;
use crate::constants::TOKEN_EXPIRY_SLACK;
use crate::errors::CredentialsError;
use crate::token::{Token, TokenProvider};
use std::sync::Arc;
use tokio::sync::Mutex;
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    // The cached token, or the last seen error, tagged with the refresh that
    // produced it.
    state: Arc<Mutex<CacheState>>,

    // Held while a refresh is in progress.
    refresh_in_progress: Arc<Mutex<()>>,

    // The token provider. This thing does the refreshing.
    inner: Arc<T>,
}

#[derive(Debug)]
struct CacheState {
    generation: u64,
    token: Result<Token>,
}

// Returns true if we are holding an error, or a token that is about to expire.
fn invalid(token: &Result<Token>) -> bool {
    match token {
        Ok(t) => t
            .expires_at
            .is_some_and(|e| e <= Instant::now() + TOKEN_EXPIRY_SLACK),
        Err(_) => true,
    }
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`.
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            state: self.state.clone(),
            refresh_in_progress: self.refresh_in_progress.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider> TokenCache<T> {
    pub(crate) fn new(inner: T) -> TokenCache<T> {
        TokenCache {
            state: Arc::new(Mutex::new(CacheState {
                generation: 0,
                token: Err(CredentialsError::from_msg(true, "no token in the cache")),
            })),
            refresh_in_progress: Arc::new(Mutex::new(())),
            inner: Arc::new(inner),
        }
    }

    // Clones the current token and its generation. Releases the lock on return.
    async fn current(&self) -> (u64, Result<Token>) {
        let state = self.state.lock().await;
        (state.generation, state.token.clone())
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for TokenCache<T> {
    async fn token(&self) -> Result<Token> {
        let (generation, token) = self.current().await;
        if !invalid(&token) {
            return token;
        }

        let _guard = self.refresh_in_progress.lock().await;

        // Another task may have completed a refresh while we waited for the
        // guard. Share its result, even if it is an error.
        let (latest, token) = self.current().await;
        if latest != generation {
            return token;
        }

        tracing::debug!("refreshing cached ID token");
        let token = self.inner.token().await;
        let mut state = self.state.lock().await;
        state.generation = latest + 1;
        state.token = token.clone();
        token
    }
}
