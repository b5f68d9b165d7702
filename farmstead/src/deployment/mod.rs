//! Deployment graph.
//!
//! The deployment controller is an external collaborator. This module models
//! only what the orchestrator needs from it: deployment-scoped resource
//! identities, ordering edges between resources, and a single finalization
//! point after which the graph is frozen.
//!
//! Ordering edges are deployment-time constraints, never runtime waits: a
//! resource is not started until every resource it depends on has reported
//! ready.

mod signal;

pub use signal::{
    CompletionReport, CompletionSignal, DEFAULT_EXECUTION_TIMEOUT, MAX_EXECUTION_TIMEOUT,
    SignalTarget, completion_channel,
};

use farmstead_shared::errors::{FarmsteadError, FarmsteadResult};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

const PATH_SEP: char = '/';
const HASH_LEN: usize = 8;

/// Deployment-scoped identity of a resource, e.g. `Farm/Registration/Instance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn path(&self) -> &str {
        &self.0
    }

    /// Globally unique, deterministic identifier derived from the path.
    ///
    /// Alphanumeric path components are concatenated and suffixed with the
    /// first eight hex digits of the path's SHA-256, so two resources whose
    /// components collapse to the same letters still differ.
    pub fn unique_id(&self) -> String {
        let readable: String = self
            .0
            .split(PATH_SEP)
            .flat_map(|component| component.chars().filter(char::is_ascii_alphanumeric))
            .collect();
        let digest = hex::encode_upper(Sha256::digest(self.0.as_bytes()));
        format!("{}{}", readable, &digest[..HASH_LEN])
    }

    /// A child identity nested under this one.
    pub fn child(&self, name: &str) -> ResourceId {
        ResourceId(format!("{}{}{}", self.0, PATH_SEP, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct Graph {
    resources: BTreeSet<ResourceId>,
    /// dependent → dependencies
    edges: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
    finalized: bool,
}

impl Graph {
    fn ensure_open(&self) -> FarmsteadResult<()> {
        if self.finalized {
            return Err(FarmsteadError::InvalidState(
                "deployment already finalized".into(),
            ));
        }
        Ok(())
    }

    fn ensure_known(&self, id: &ResourceId) -> FarmsteadResult<()> {
        if !self.resources.contains(id) {
            return Err(FarmsteadError::Graph(format!("unknown resource {}", id)));
        }
        Ok(())
    }
}

struct DeploymentInner {
    stack_name: String,
    region: String,
    graph: RwLock<Graph>,
}

/// Handle to one deployment. Cheap to clone; all clones share the graph.
#[derive(Clone)]
pub struct Deployment {
    inner: Arc<DeploymentInner>,
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("stack_name", &self.inner.stack_name)
            .field("region", &self.inner.region)
            .finish()
    }
}

impl Deployment {
    pub fn new(stack_name: impl Into<String>, region: impl Into<String>) -> FarmsteadResult<Self> {
        let stack_name = stack_name.into();
        let region = region.into();
        if stack_name.is_empty() || region.is_empty() {
            return Err(FarmsteadError::Config(
                "deployment requires a stack name and a region".into(),
            ));
        }

        Ok(Self {
            inner: Arc::new(DeploymentInner {
                stack_name,
                region,
                graph: RwLock::new(Graph::default()),
            }),
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.inner.stack_name
    }

    pub fn region(&self) -> &str {
        &self.inner.region
    }

    /// Declare a resource at `path`. Paths are unique within a deployment.
    pub fn add_resource(&self, path: impl Into<String>) -> FarmsteadResult<ResourceId> {
        let path = path.into();
        if path.is_empty() || path.split(PATH_SEP).any(str::is_empty) {
            return Err(FarmsteadError::Config(format!(
                "invalid resource path \"{}\"",
                path
            )));
        }

        let mut graph = self.inner.graph.write();
        graph.ensure_open()?;

        let id = ResourceId(path);
        if !graph.resources.insert(id.clone()) {
            return Err(FarmsteadError::Graph(format!(
                "resource {} already exists",
                id
            )));
        }
        tracing::trace!(resource = %id, "Declared resource");
        Ok(id)
    }

    /// `dependent` must not start until `dependency` has reported ready.
    pub fn add_dependency(&self, dependent: &ResourceId, dependency: &ResourceId) -> FarmsteadResult<()> {
        let mut graph = self.inner.graph.write();
        graph.ensure_open()?;
        graph.ensure_known(dependent)?;
        graph.ensure_known(dependency)?;

        if dependent == dependency {
            return Err(FarmsteadError::Graph(format!(
                "resource {} cannot depend on itself",
                dependent
            )));
        }

        let added = graph
            .edges
            .entry(dependent.clone())
            .or_default()
            .insert(dependency.clone());
        if added {
            tracing::debug!(dependent = %dependent, dependency = %dependency, "Added ordering edge");
        }
        Ok(())
    }

    /// Direct dependencies of `id`, sorted by path.
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.inner
            .graph
            .read()
            .edges
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn depends_on(&self, dependent: &ResourceId, dependency: &ResourceId) -> bool {
        self.inner
            .graph
            .read()
            .edges
            .get(dependent)
            .is_some_and(|deps| deps.contains(dependency))
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.graph.read().finalized
    }

    /// Freeze the graph and return a deployment order in which every
    /// resource follows all of its dependencies.
    ///
    /// Ties are broken by path so the order is deterministic.
    pub fn finalize(&self) -> FarmsteadResult<Vec<ResourceId>> {
        let mut graph = self.inner.graph.write();
        graph.ensure_open()?;

        let mut remaining: BTreeMap<&ResourceId, usize> = graph
            .resources
            .iter()
            .map(|id| (id, graph.edges.get(id).map_or(0, BTreeSet::len)))
            .collect();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready: Vec<&ResourceId> = remaining
                .iter()
                .filter(|(_, pending)| **pending == 0)
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                let stuck: Vec<String> = remaining.keys().map(|id| id.to_string()).collect();
                return Err(FarmsteadError::Graph(format!(
                    "dependency cycle among: {}",
                    stuck.join(", ")
                )));
            }

            for id in ready {
                remaining.remove(id);
                for (dependent, deps) in &graph.edges {
                    if deps.contains(id)
                        && let Some(pending) = remaining.get_mut(dependent)
                    {
                        *pending -= 1;
                    }
                }
                order.push(id.clone());
            }
        }

        graph.finalized = true;
        tracing::info!(
            stack = %self.inner.stack_name,
            resources = order.len(),
            "Deployment finalized"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Deployment {
        Deployment::new("FarmStack", "us-west-2").unwrap()
    }

    #[test]
    fn test_unique_id_is_stable_and_distinct() {
        let d = deployment();
        let a = d.add_resource("Farm/Instance").unwrap();
        let b = d.add_resource("Farm-/Instance").unwrap();

        assert_eq!(a.unique_id(), a.unique_id());
        assert!(a.unique_id().starts_with("FarmInstance"));
        assert_eq!(a.unique_id().len(), "FarmInstance".len() + HASH_LEN);
        assert_ne!(a.unique_id(), b.unique_id());
    }

    #[test]
    fn test_duplicate_and_invalid_paths() {
        let d = deployment();
        d.add_resource("Farm/Db").unwrap();
        assert!(d.add_resource("Farm/Db").is_err());
        assert!(d.add_resource("Farm//Db").is_err());
        assert!(d.add_resource("").is_err());
    }

    #[test]
    fn test_finalize_orders_dependencies_first() {
        let d = deployment();
        let db = d.add_resource("Farm/Db").unwrap();
        let instance = d.add_resource("Farm/Instance").unwrap();
        let workers = d.add_resource("Farm/Workers").unwrap();
        d.add_dependency(&instance, &db).unwrap();
        d.add_dependency(&workers, &instance).unwrap();

        let order = d.finalize().unwrap();
        let pos = |id: &ResourceId| order.iter().position(|o| o == id).unwrap();
        assert!(pos(&db) < pos(&instance));
        assert!(pos(&instance) < pos(&workers));
        assert!(d.is_finalized());
    }

    #[test]
    fn test_cycle_is_reported() {
        let d = deployment();
        let a = d.add_resource("A").unwrap();
        let b = d.add_resource("B").unwrap();
        d.add_dependency(&a, &b).unwrap();
        d.add_dependency(&b, &a).unwrap();

        let err = d.finalize().unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
        assert!(!d.is_finalized());
    }

    #[test]
    fn test_graph_frozen_after_finalize() {
        let d = deployment();
        let a = d.add_resource("A").unwrap();
        let b = d.add_resource("B").unwrap();
        d.finalize().unwrap();

        assert!(matches!(
            d.add_dependency(&a, &b),
            Err(FarmsteadError::InvalidState(_))
        ));
        assert!(d.add_resource("C").is_err());
        assert!(d.finalize().is_err());
    }

    #[test]
    fn test_self_and_unknown_edges_rejected() {
        let d = deployment();
        let a = d.add_resource("A").unwrap();
        let stranger = ResourceId("Elsewhere".into());
        assert!(d.add_dependency(&a, &a).is_err());
        assert!(d.add_dependency(&a, &stranger).is_err());
        assert!(d.dependencies_of(&a).is_empty());
    }
}
