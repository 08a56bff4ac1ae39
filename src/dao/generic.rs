use kube::core::DynamicObject;
use std::sync::Arc;

use crate::dao::{Accessor, Capabilities, Factory, Listable, NonResource};
use crate::error::DaoResult;
use crate::gvr::Gvr;
use crate::model::RowData;
use crate::render::{GENERIC_HEADERS, generic_row, headers};

/// Plain listable kinds with no extra capability.
#[derive(Default)]
pub struct Generic {
    base: NonResource,
}

#[async_trait::async_trait]
impl Accessor for Generic {
    fn init(&self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.bind(factory, gvr);
    }

    fn gvr(&self) -> Gvr {
        self.base.gvr()
    }

    fn factory(&self) -> DaoResult<Arc<dyn Factory>> {
        self.base.factory()
    }

    async fn get(&self, path: &str) -> DaoResult<DynamicObject> {
        let (factory, gvr) = self.base.snapshot()?;
        Ok(factory.get(&gvr, path).await?)
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities {
            listable: Some(self),
            ..Capabilities::default()
        }
    }
}

#[async_trait::async_trait]
impl Listable for Generic {
    fn headers(&self) -> Vec<String> {
        headers(&GENERIC_HEADERS)
    }

    async fn list(&self, path: &str) -> DaoResult<Vec<RowData>> {
        let (factory, gvr) = self.base.snapshot()?;
        let items = factory
            .list(&gvr, Some(path).filter(|ns| !ns.is_empty()), None)
            .await?;
        Ok(items.iter().map(generic_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::Generic;
    use crate::dao::testing::{MockFactory, config_map};
    use crate::dao::{Accessor, Capability, Listable, Resolved};
    use crate::gvr::{CONFIG_MAPS, Gvr};
    use std::sync::Arc;

    #[tokio::test]
    async fn lists_and_gets_plain_objects() {
        let accessor = Arc::new(Generic::default());
        accessor.init(
            Arc::new(
                MockFactory::default()
                    .with_object(CONFIG_MAPS, config_map("shop", "settings"))
                    .with_object(CONFIG_MAPS, config_map("other", "flags")),
            ),
            Gvr::new(CONFIG_MAPS),
        );

        let rows = accessor.list("shop").await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns[..2], ["settings".to_string(), "shop".to_string()]);

        let object = accessor.get("other/flags").await.expect("object");
        assert_eq!(object.metadata.name.as_deref(), Some("flags"));

        let resolved = Resolved::new(accessor);
        assert!(resolved.caps.supports(Capability::Listable));
        assert!(!resolved.caps.supports(Capability::Loggable));
    }
}
