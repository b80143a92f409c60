//! Source catalogue
//!
//! The fixed, ordered set of remote datasets the pipeline acquires.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Public host of the IMDb non-commercial datasets
pub const DEFAULT_DATASETS_BASE_URL: &str = "https://datasets.imdbws.com";

/// Logical names of the IMDb datasets, in catalogue order
pub const IMDB_DATASETS: [&str; 7] = [
    "name.basics.tsv.gz",
    "title.akas.tsv.gz",
    "title.basics.tsv.gz",
    "title.crew.tsv.gz",
    "title.episode.tsv.gz",
    "title.principals.tsv.gz",
    "title.ratings.tsv.gz",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogueError {
    #[error("Duplicate source name: {0}")]
    DuplicateName(String),

    #[error("Invalid source name: {0:?}")]
    InvalidName(String),

    #[error("Source {name} has unsupported URL {url}")]
    InvalidUrl { name: String, url: String },
}

/// One remote resource and the artifact name it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalogue {
    sources: Vec<SourceDescriptor>,
}

impl Catalogue {
    /// Validate and wrap an ordered set of sources
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self, CatalogueError> {
        let mut seen = HashSet::new();
        for source in &sources {
            if crate::storage::validate_name(&source.name).is_err() {
                return Err(CatalogueError::InvalidName(source.name.clone()));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(CatalogueError::DuplicateName(source.name.clone()));
            }
            if !(source.url.starts_with("http://") || source.url.starts_with("https://")) {
                return Err(CatalogueError::InvalidUrl {
                    name: source.name.clone(),
                    url: source.url.clone(),
                });
            }
        }
        Ok(Self { sources })
    }

    /// The seven IMDb datasets served under `base_url`
    pub fn imdb(base_url: &str) -> Result<Self, CatalogueError> {
        let base_url = base_url.trim_end_matches('/');
        Self::new(
            IMDB_DATASETS
                .iter()
                .map(|name| SourceDescriptor::new(*name, format!("{}/{}", base_url, name)))
                .collect(),
        )
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imdb_catalogue() {
        let catalogue = Catalogue::imdb(DEFAULT_DATASETS_BASE_URL).unwrap();
        assert_eq!(catalogue.len(), 7);
        assert_eq!(
            catalogue.sources()[0],
            SourceDescriptor::new(
                "name.basics.tsv.gz",
                "https://datasets.imdbws.com/name.basics.tsv.gz"
            )
        );
        assert_eq!(
            catalogue.names().last(),
            Some("title.ratings.tsv.gz")
        );
    }

    #[test]
    fn test_imdb_catalogue_trims_trailing_slash() {
        let catalogue = Catalogue::imdb("http://127.0.0.1:8080/").unwrap();
        assert_eq!(
            catalogue.sources()[3].url,
            "http://127.0.0.1:8080/title.crew.tsv.gz"
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Catalogue::new(vec![
            SourceDescriptor::new("a.tsv.gz", "http://host/a"),
            SourceDescriptor::new("a.tsv.gz", "http://host/b"),
        ]);
        assert_eq!(result, Err(CatalogueError::DuplicateName("a.tsv.gz".to_string())));
    }

    #[test]
    fn test_bad_url_rejected() {
        let result = Catalogue::new(vec![SourceDescriptor::new("a.tsv.gz", "ftp://host/a")]);
        assert!(matches!(result, Err(CatalogueError::InvalidUrl { .. })));
    }

    #[test]
    fn test_bad_name_rejected() {
        let result = Catalogue::new(vec![SourceDescriptor::new("dir/a.tsv.gz", "http://host/a")]);
        assert!(matches!(result, Err(CatalogueError::InvalidName(_))));
    }
}
