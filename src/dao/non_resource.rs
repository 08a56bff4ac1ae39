use kube::core::DynamicObject;
use std::sync::{Arc, RwLock};

use crate::dao::{Accessor, Capabilities, Factory};
use crate::error::{DaoError, DaoResult};
use crate::gvr::Gvr;

struct Binding {
    factory: Arc<dyn Factory>,
    gvr: Gvr,
}

/// Base accessor for kinds that are not addressable cluster objects.
///
/// Holds the factory/identifier binding behind a reader/writer lock and
/// implements no capability of its own.
#[derive(Default)]
pub struct NonResource {
    binding: RwLock<Option<Binding>>,
}

impl NonResource {
    pub fn bind(&self, factory: Arc<dyn Factory>, gvr: Gvr) {
        let mut binding = self
            .binding
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *binding = Some(Binding { factory, gvr });
    }

    pub fn gvr(&self) -> Gvr {
        self.binding
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|binding| binding.gvr.clone())
            .unwrap_or_default()
    }

    pub fn factory(&self) -> DaoResult<Arc<dyn Factory>> {
        self.snapshot().map(|(factory, _)| factory)
    }

    /// Factory and identifier read under a single shared lock.
    pub fn snapshot(&self) -> DaoResult<(Arc<dyn Factory>, Gvr)> {
        let binding = self
            .binding
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        binding
            .as_ref()
            .map(|binding| (binding.factory.clone(), binding.gvr.clone()))
            .ok_or(DaoError::Unbound)
    }
}

#[async_trait::async_trait]
impl Accessor for NonResource {
    fn init(&self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.bind(factory, gvr);
    }

    fn gvr(&self) -> Gvr {
        NonResource::gvr(self)
    }

    fn factory(&self) -> DaoResult<Arc<dyn Factory>> {
        NonResource::factory(self)
    }

    async fn get(&self, path: &str) -> DaoResult<DynamicObject> {
        Err(DaoError::NotImplemented(format!("get {} {path}", self.gvr())))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::NonResource;
    use crate::dao::testing::MockFactory;
    use crate::dao::{Accessor, Capability, Resolved};
    use crate::error::DaoError;
    use crate::gvr::Gvr;
    use std::sync::Arc;

    #[tokio::test]
    async fn get_is_not_implemented() {
        let accessor = Arc::new(NonResource::default());
        accessor.init(Arc::new(MockFactory::default()), Gvr::new("v1/widgets"));

        let err = accessor.get("ns/a").await.expect_err("get must fail");
        assert!(matches!(err, DaoError::NotImplemented(_)));
    }

    #[test]
    fn exposes_no_capability() {
        let resolved = Resolved::new(Arc::new(NonResource::default()));
        assert!(!resolved.caps.supports(Capability::Listable));
        assert!(!resolved.caps.supports(Capability::Loggable));
        assert!(!resolved.caps.supports(Capability::ContainsPodSpec));
        assert!(matches!(
            resolved.loggable(),
            Err(DaoError::CapabilityUnsupported { .. })
        ));
    }

    #[test]
    fn unbound_accessor_reports_instead_of_panicking() {
        let accessor = NonResource::default();
        assert_eq!(accessor.gvr(), Gvr::default());
        assert!(matches!(accessor.factory(), Err(DaoError::Unbound)));
        assert!(matches!(accessor.snapshot(), Err(DaoError::Unbound)));
        assert_eq!(
            DaoError::Unbound.to_string(),
            "accessor used before it was bound to a factory"
        );
    }

    #[test]
    fn rebind_replaces_factory_and_identifier_together() {
        let accessor = Arc::new(NonResource::default());
        accessor.init(Arc::new(MockFactory::default()), Gvr::new("v1/pods"));
        assert_eq!(accessor.gvr(), Gvr::new("v1/pods"));

        let readers = (0..4)
            .map(|_| {
                let accessor = accessor.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let (_, gvr) = accessor.snapshot().expect("bound");
                        assert!(gvr == Gvr::new("v1/pods") || gvr == Gvr::new("containers"));
                    }
                })
            })
            .collect::<Vec<_>>();
        accessor.init(Arc::new(MockFactory::default()), Gvr::new("containers"));
        for reader in readers {
            reader.join().expect("reader thread");
        }

        assert_eq!(accessor.gvr(), Gvr::new("containers"));
    }
}
