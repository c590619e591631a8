//! `random:name`, `random:dashed-name` and `random:int`. Values differ on every run.

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;

use stencil_core::{ImportFailure, ImportLocation, Scheme};

use crate::{FetchResult, Fetched, Importer};

const ADJECTIVES: [&str; 16] = [
    "amber", "brave", "calm", "dapper", "eager", "fancy", "gentle", "happy", "jolly", "keen",
    "lucid", "mellow", "nimble", "proud", "quiet", "swift",
];

const NOUNS: [&str; 16] = [
    "badger", "comet", "dolphin", "falcon", "glacier", "harbor", "island", "lagoon", "meadow",
    "otter", "pebble", "quasar", "river", "summit", "tiger", "willow",
];

pub struct RandomImporter;

impl RandomImporter {
    /// Generate a value for `kind` without going through a location.
    pub fn generate(kind: &str) -> Option<String> {
        let mut rng = rand::thread_rng();
        let mut word = |words: &[&'static str]| words.choose(&mut rng).copied().unwrap_or("x");
        Some(match kind {
            "name" => format!("{}{}", word(&ADJECTIVES), word(&NOUNS)),
            "dashed-name" => format!("{}-{}", word(&ADJECTIVES), word(&NOUNS)),
            "int" => rand::thread_rng().gen_range(1..=1000).to_string(),
            _ => return None,
        })
    }
}

#[async_trait]
impl Importer for RandomImporter {
    fn name(&self) -> &'static str {
        "random"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::Random]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let value = Self::generate(&location.path).ok_or_else(|| {
            ImportFailure::InvalidLocation(format!(
                "random:{} (expected name, dashed-name or int)",
                location.path
            ))
        })?;
        Ok(Fetched::text(location.to_string(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let dashed = RandomImporter::generate("dashed-name").unwrap();
        let (adjective, noun) = dashed.split_once('-').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(NOUNS.contains(&noun));

        let name = RandomImporter::generate("name").unwrap();
        assert!(!name.contains('-'));

        let n: u32 = RandomImporter::generate("int").unwrap().parse().unwrap();
        assert!((1..=1000).contains(&n));

        assert!(RandomImporter::generate("uuid").is_none());
    }
}
