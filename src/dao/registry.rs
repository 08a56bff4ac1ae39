use std::collections::HashMap;
use std::sync::Arc;

use crate::dao::{Accessor, Capability, Container, Factory, Generic, Pod, Resolved, Workload};
use crate::error::{DaoError, DaoResult};
use crate::gvr::{
    CONFIG_MAPS, CONTAINERS, DAEMON_SETS, DEPLOYMENTS, Gvr, JOBS, NAMESPACES, NODES, PODS,
    REPLICA_SETS, SECRETS, SERVICE_ACCOUNTS, SERVICES, STATEFUL_SETS,
};

const WORKLOADS: [&str; 5] = [DEPLOYMENTS, STATEFUL_SETS, DAEMON_SETS, REPLICA_SETS, JOBS];
const GENERICS: [&str; 6] = [
    SERVICES,
    CONFIG_MAPS,
    SECRETS,
    NAMESPACES,
    NODES,
    SERVICE_ACCOUNTS,
];

/// Maps resource identifiers to bound accessors.
pub struct AccessorRegistry {
    factory: Arc<dyn Factory>,
    accessors: HashMap<Gvr, Resolved>,
}

impl AccessorRegistry {
    /// Registry holding every built-in kind bound to `factory`.
    pub fn new(factory: Arc<dyn Factory>) -> Self {
        let mut registry = Self {
            factory,
            accessors: HashMap::new(),
        };
        registry.register(Gvr::new(PODS), Arc::new(Pod::default()));
        registry.register(Gvr::new(CONTAINERS), Arc::new(Container::default()));
        for gvr in WORKLOADS {
            registry.register(Gvr::new(gvr), Arc::new(Workload::default()));
        }
        for gvr in GENERICS {
            registry.register(Gvr::new(gvr), Arc::new(Generic::default()));
        }
        registry
    }

    /// Binds `accessor` to the shared factory and makes it resolvable. A
    /// later registration for the same identifier replaces the earlier one.
    pub fn register(&mut self, gvr: Gvr, accessor: Arc<dyn Accessor>) {
        accessor.init(self.factory.clone(), gvr.clone());
        self.accessors.insert(gvr, Resolved::new(accessor));
    }

    pub fn resolve(&self, gvr: &Gvr) -> DaoResult<Resolved> {
        self.accessors
            .get(gvr)
            .cloned()
            .ok_or_else(|| DaoError::NotFound(gvr.to_string()))
    }
}

pub fn capability_check(resolved: &Resolved, capability: Capability) -> bool {
    resolved.caps.supports(capability)
}
