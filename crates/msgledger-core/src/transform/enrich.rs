//! Lookups that fill optional fields the listing endpoint leaves out.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::Result;

/// Source of enrichment data, keyed by remote IDs.
#[async_trait]
pub trait EnrichmentLookup: Send + Sync {
    /// Name of a property.
    async fn property_name(&self, property_id: &str) -> Result<Option<String>>;

    /// Total price of a reservation.
    async fn reservation_price(&self, reservation_id: &str) -> Result<Option<Decimal>>;

    /// Body of the first message in a conversation listed without one.
    async fn conversation_content(&self, _conversation_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Lookup that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait]
impl EnrichmentLookup for NoEnrichment {
    async fn property_name(&self, _property_id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn reservation_price(&self, _reservation_id: &str) -> Result<Option<Decimal>> {
        Ok(None)
    }
}

/// Per-run memo of property names so each property is looked up once.
#[derive(Debug, Default)]
pub(crate) struct PropertyNames {
    names: HashMap<String, Option<String>>,
}

impl PropertyNames {
    /// Cached name, or a fresh lookup whose outcome is cached.
    ///
    /// Failed lookups are cached as `None`.
    pub(crate) async fn resolve(
        &mut self,
        lookup: &dyn EnrichmentLookup,
        property_id: &str,
    ) -> Option<String> {
        if let Some(name) = self.names.get(property_id) {
            return name.clone();
        }

        let name = match lookup.property_name(property_id).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(property_id, error = %e, "property lookup failed");
                None
            }
        };
        self.names.insert(property_id.to_string(), name.clone());
        name
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}
