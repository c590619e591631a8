//! `http://` and `https://` GET.

use async_trait::async_trait;
use reqwest::StatusCode;

use stencil_core::{ImportFailure, ImportLocation, Scheme};

use crate::{FetchResult, Fetched, Importer};

pub struct HttpImporter {
    client: reqwest::Client,
}

impl HttpImporter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Importer for HttpImporter {
    fn name(&self) -> &'static str {
        "http"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::Http, Scheme::Https]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let response = self
            .client
            .get(&location.path)
            .header("User-Agent", "stencil")
            .send()
            .await
            .map_err(|e| ImportFailure::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ImportFailure::NotFound(location.path.clone()));
        }
        if !status.is_success() {
            return Err(ImportFailure::Request(format!(
                "GET {} returned {}",
                location.path, status
            )));
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| ImportFailure::Request(e.to_string()))?;
        Ok(Fetched::bytes(location.path.clone(), raw.to_vec()))
    }
}
