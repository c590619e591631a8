//! `env:NAME` and `env:NAME:default`.

use async_trait::async_trait;
use stencil_core::{ImportFailure, ImportLocation, Scheme};

use crate::{FetchResult, Fetched, Importer};

pub struct EnvImporter;

#[async_trait]
impl Importer for EnvImporter {
    fn name(&self) -> &'static str {
        "env"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::Env]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let (name, default) = match location.path.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (location.path.as_str(), None),
        };
        let value = match std::env::var(name) {
            Ok(value) => value,
            Err(_) => default.map(str::to_string).ok_or_else(|| {
                ImportFailure::NotFound(format!("environment variable {name}"))
            })?,
        };
        Ok(Fetched::text(location.to_string(), value))
    }
}
