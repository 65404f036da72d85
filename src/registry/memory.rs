//! In-memory registry store backed by `DashMap`.

use async_trait::async_trait;
use dashmap::DashMap;

use super::types::{Connection, RegistryError, ScanCursor, ScanPage};
use super::RegistryStore;

/// In-memory registry store.
///
/// Scan pages are served from a sorted snapshot of the identities; the cursor
/// is the last identity of the previous page. Rows written or removed between
/// pages may or may not be observed, matching the non-transactional contract.
pub struct MemoryRegistryStore {
    rows: DashMap<String, Connection>,
    page_size: usize,
}

impl MemoryRegistryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            rows: DashMap::new(),
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, identity: &str) -> Result<Option<Connection>, RegistryError> {
        Ok(self.rows.get(identity).map(|r| r.clone()))
    }

    async fn put(&self, row: &Connection) -> Result<(), RegistryError> {
        self.rows.insert(row.identity.clone(), row.clone());
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), RegistryError> {
        self.rows.remove(identity);
        Ok(())
    }

    async fn scan(&self, cursor: Option<ScanCursor>) -> Result<ScanPage, RegistryError> {
        let mut identities: Vec<String> = self.rows.iter().map(|e| e.key().clone()).collect();
        identities.sort();

        let start = match &cursor {
            Some(c) => identities.partition_point(|k| k.as_str() <= c.0.as_str()),
            None => 0,
        };

        let page: Vec<String> = identities[start..]
            .iter()
            .take(self.page_size)
            .cloned()
            .collect();
        let rows: Vec<Connection> = page
            .iter()
            .filter_map(|id| self.rows.get(id).map(|r| r.clone()))
            .collect();

        let next = if start + page.len() < identities.len() {
            page.last().map(|last| ScanCursor(last.clone()))
        } else {
            None
        };

        Ok(ScanPage { rows, next })
    }

    async fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.rows.len())
    }
}
