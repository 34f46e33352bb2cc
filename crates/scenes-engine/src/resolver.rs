//! Set-value resolution
//!
//! A configured set value may be a literal or an indirection of the form
//! `{{pointId}}`, meaning "the current value of that point". Indirections
//! are resolved fresh on every use: the referenced point's value may
//! change between scene loads, so nothing is cached.

use std::sync::Arc;

use scenes_core::{PointId, PointValue};

use crate::error::{EngineError, EngineResult};
use crate::port::PointPort;

/// Resolves configured set values against the live point space
#[derive(Clone)]
pub struct ValueResolver {
    port: Arc<dyn PointPort>,
}

impl ValueResolver {
    /// Create a new resolver reading through the given port
    pub fn new(port: Arc<dyn PointPort>) -> Self {
        Self { port }
    }

    /// Resolve a configured set value
    ///
    /// Strings of the form `{{pointId}}` are replaced by the referenced
    /// point's current value; everything else passes through unchanged.
    /// Fails with `ReferenceEmpty` for `{{}}` and `ReferenceMissing` when
    /// the referenced point has no current value.
    pub async fn resolve(&self, spec: &PointValue) -> EngineResult<PointValue> {
        let PointValue::Text(raw) = spec else {
            return Ok(spec.clone());
        };

        let Some(reference) = raw
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
        else {
            return Ok(spec.clone());
        };

        let reference = reference.trim();
        if reference.is_empty() {
            return Err(EngineError::ReferenceEmpty);
        }

        let point_id =
            PointId::new(reference).map_err(|_| EngineError::ReferenceEmpty)?;

        match self.port.read_point(&point_id).await? {
            Some(sample) => Ok(sample.value),
            None => Err(EngineError::ReferenceMissing(point_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenes_core::Context;
    use scenes_event_bus::EventBus;
    use scenes_point_store::PointStore;

    fn resolver_with_store() -> (ValueResolver, Arc<PointStore>) {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(PointStore::new(bus));
        (ValueResolver::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_literals_pass_through() {
        let (resolver, _store) = resolver_with_store();

        for literal in [
            PointValue::Bool(true),
            PointValue::Number(42.0),
            PointValue::Text("on".to_string()),
            PointValue::Null,
        ] {
            assert_eq!(resolver.resolve(&literal).await.unwrap(), literal);
        }
    }

    #[tokio::test]
    async fn test_reference_resolves_to_live_value() {
        let (resolver, store) = resolver_with_store();
        let id = PointId::new("sensor.outside").unwrap();
        store.set(id, PointValue::Number(7.5), true, Context::new());

        let resolved = resolver
            .resolve(&PointValue::from("{{sensor.outside}}"))
            .await
            .unwrap();
        assert_eq!(resolved, PointValue::Number(7.5));
    }

    #[tokio::test]
    async fn test_reference_is_fresh_each_use() {
        let (resolver, store) = resolver_with_store();
        let id = PointId::new("sensor.outside").unwrap();
        let spec = PointValue::from("{{sensor.outside}}");

        store.set(id.clone(), PointValue::Number(1.0), true, Context::new());
        assert_eq!(
            resolver.resolve(&spec).await.unwrap(),
            PointValue::Number(1.0)
        );

        store.set(id, PointValue::Number(2.0), true, Context::new());
        assert_eq!(
            resolver.resolve(&spec).await.unwrap(),
            PointValue::Number(2.0)
        );
    }

    #[tokio::test]
    async fn test_empty_reference_fails() {
        let (resolver, _store) = resolver_with_store();
        let err = resolver
            .resolve(&PointValue::from("{{}}"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReferenceEmpty));

        let err = resolver
            .resolve(&PointValue::from("{{   }}"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReferenceEmpty));
    }

    #[tokio::test]
    async fn test_missing_reference_fails() {
        let (resolver, _store) = resolver_with_store();
        let err = resolver
            .resolve(&PointValue::from("{{sensor.nowhere}}"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReferenceMissing(_)));
    }
}
