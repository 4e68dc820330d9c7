use std::collections::HashMap;
use thiserror::Error;

use gmind_model::{FieldId, GreenhouseId};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog lookup failed: {0}")]
    Lookup(String),
}

/// Target-validation seam consulted at scheduling time. The real
/// catalog is the external greenhouse data service; the dispatcher
/// itself never touches it (staleness, not existence, is its gate).
#[async_trait::async_trait]
pub trait GreenhouseCatalog: Send + Sync {
    async fn greenhouse_exists(&self, greenhouse: &GreenhouseId) -> Result<bool, CatalogError>;

    async fn field_exists(
        &self,
        greenhouse: &GreenhouseId,
        field: FieldId,
    ) -> Result<bool, CatalogError>;
}

/// Fixed greenhouse -> field-count catalog, loaded from daemon
/// config. Fields are indexed 0..count the way the data service
/// numbers them
#[derive(Default)]
pub struct StaticCatalog {
    field_counts: HashMap<GreenhouseId, FieldId>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greenhouse(mut self, greenhouse: GreenhouseId, fields: FieldId) -> Self {
        self.field_counts.insert(greenhouse, fields);
        self
    }
}

impl FromIterator<(GreenhouseId, FieldId)> for StaticCatalog {
    fn from_iter<T: IntoIterator<Item = (GreenhouseId, FieldId)>>(iter: T) -> Self {
        Self {
            field_counts: iter.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl GreenhouseCatalog for StaticCatalog {
    async fn greenhouse_exists(&self, greenhouse: &GreenhouseId) -> Result<bool, CatalogError> {
        Ok(self.field_counts.contains_key(greenhouse))
    }

    async fn field_exists(
        &self,
        greenhouse: &GreenhouseId,
        field: FieldId,
    ) -> Result<bool, CatalogError> {
        Ok(self
            .field_counts
            .get(greenhouse)
            .map(|count| field >= 0 && field < *count)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_catalog_bounds_fields() {
        let catalog = StaticCatalog::new().with_greenhouse("g1".to_string(), 2);

        assert!(catalog.greenhouse_exists(&"g1".to_string()).await.unwrap());
        assert!(!catalog.greenhouse_exists(&"g2".to_string()).await.unwrap());

        assert!(catalog.field_exists(&"g1".to_string(), 0).await.unwrap());
        assert!(catalog.field_exists(&"g1".to_string(), 1).await.unwrap());
        assert!(!catalog.field_exists(&"g1".to_string(), 2).await.unwrap());
        assert!(!catalog.field_exists(&"g1".to_string(), -1).await.unwrap());
        assert!(!catalog.field_exists(&"g2".to_string(), 0).await.unwrap());
    }
}
