//! # Document Loader
//!
//! Fetches documents that references point into. Concurrent requests for the
//! same document share one fetch; a failed fetch is not remembered, so a later
//! request tries again.

use crate::address::CanonicalAddress;
use crate::error::{AppError, AppResult};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Source of raw documents.
pub trait DocumentFetcher: Send + Sync {
    /// Fetches and parses the document containing `address`.
    fn fetch<'a>(&'a self, address: &'a CanonicalAddress) -> BoxFuture<'a, AppResult<Value>>;
}

/// Fetcher for setups where every document is registered up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetcher;

impl DocumentFetcher for NoFetcher {
    fn fetch<'a>(&'a self, address: &'a CanonicalAddress) -> BoxFuture<'a, AppResult<Value>> {
        Box::pin(async move {
            Err(AppError::Reference(format!(
                "document '{}' is not loaded",
                address.document()
            )))
        })
    }
}

/// Serves documents from memory, keyed by document address.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    documents: HashMap<CanonicalAddress, Value>,
}

impl MemoryFetcher {
    /// An empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document under `location`.
    pub fn insert(&mut self, location: &str, document: Value) -> AppResult<()> {
        let address = CanonicalAddress::parse(location)?.document();
        self.documents.insert(address, document);
        Ok(())
    }

    /// Builder-style `insert`.
    pub fn with_document(mut self, location: &str, document: Value) -> AppResult<Self> {
        self.insert(location, document)?;
        Ok(self)
    }
}

impl DocumentFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, address: &'a CanonicalAddress) -> BoxFuture<'a, AppResult<Value>> {
        Box::pin(async move {
            self.documents.get(&address.document()).cloned().ok_or_else(|| {
                AppError::Reference(format!("no such document '{}'", address.document()))
            })
        })
    }
}

/// Reads `file:` documents from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl DocumentFetcher for FileFetcher {
    fn fetch<'a>(&'a self, address: &'a CanonicalAddress) -> BoxFuture<'a, AppResult<Value>> {
        Box::pin(async move {
            let path = address.document_url().to_file_path().map_err(|_| {
                AppError::Address(format!("'{}' is not a local file location", address))
            })?;
            let text = tokio::fs::read_to_string(&path).await?;
            parse_document_str(address, &text)
        })
    }
}

/// Parses YAML or JSON document text.
pub fn parse_document_str(address: &CanonicalAddress, text: &str) -> AppResult<Value> {
    serde_yaml::from_str(text)
        .map_err(|e| AppError::Document(format!("Failed to parse '{}': {}", address, e)))
}

type InFlight = HashMap<CanonicalAddress, Arc<OnceCell<Arc<Value>>>>;

/// Deduplicating front of a `DocumentFetcher`.
#[derive(Clone)]
pub struct DocumentLoader {
    fetcher: Arc<dyn DocumentFetcher>,
    documents: Arc<Mutex<InFlight>>,
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader").finish_non_exhaustive()
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(NoFetcher)
    }
}

impl DocumentLoader {
    /// Loader fronting `fetcher`.
    pub fn new(fetcher: impl DocumentFetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            documents: Arc::default(),
        }
    }

    /// Returns the document containing `address`, fetching it at most once.
    pub async fn load(&self, address: &CanonicalAddress) -> AppResult<Arc<Value>> {
        let key = address.document();
        let cell = {
            let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(documents.entry(key.clone()).or_default())
        };
        let document = cell
            .get_or_try_init(|| async {
                tracing::debug!("Fetching document {}", key);
                self.fetcher.fetch(&key).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(document))
    }
}
