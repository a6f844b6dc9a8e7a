//! DAG of request sets, each node owning a [`ResourceIndex`] derived from
//! its best-matching parent.

use crate::cache_object::{NodeCacheObject, RequestGraphCacheObject};
use crate::request::{Request, RequestSet};
use crate::{Error, Result};
use buildcache_resource::Reader;
use buildcache_tree::{ResourceIndex, ResourceInput, ResourceMeta};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A single node in a [`RequestGraph`]: the requests added at this node
/// (relative to its parent) and the resource index they produced.
#[derive(Debug, Clone)]
pub struct RequestGraphNode {
    /// This node's id
    pub id: u64,
    /// The parent this node derived from, if any
    pub parent_id: Option<u64>,
    /// Requests newly added at this node, i.e. not already covered by the parent
    pub added_requests: RequestSet,
    /// The resource index covering this node's full accumulated request set
    pub index: ResourceIndex,
}

/// A DAG of request sets. Each new request set attaches to the existing
/// node whose accumulated set is the largest proper subset of the new set,
/// storing only the delta and deriving its index from the parent's.
#[derive(Default)]
pub struct RequestGraph {
    nodes: HashMap<u64, RequestGraphNode>,
    next_id: u64,
}

impl RequestGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: u64) -> Option<&RequestGraphNode> {
        self.nodes.get(&id)
    }

    /// All node ids, in insertion order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The full set of requests accumulated from the root down to `id`.
    #[must_use]
    pub fn accumulated_requests(&self, id: u64) -> BTreeSet<Request> {
        let mut set = BTreeSet::new();
        let mut current = Some(id);
        let mut chain = Vec::new();
        while let Some(nid) = current {
            let Some(node) = self.nodes.get(&nid) else { break };
            chain.push(nid);
            current = node.parent_id;
        }
        for nid in chain {
            if let Some(node) = self.nodes.get(&nid) {
                set.extend(node.added_requests.iter().cloned());
            }
        }
        set
    }

    /// Find a node whose accumulated request set, compared as a set (order
    /// irrelevant), equals `requests` exactly.
    #[must_use]
    pub fn find_exact_match(&self, requests: &RequestSet) -> Option<u64> {
        let target: BTreeSet<Request> = requests.iter().cloned().collect();
        self.node_ids()
            .into_iter()
            .find(|&id| self.accumulated_requests(id) == target)
    }

    fn find_best_parent(&self, requests: &BTreeSet<Request>) -> Option<u64> {
        self.node_ids()
            .into_iter()
            .filter_map(|id| {
                let acc = self.accumulated_requests(id);
                (acc.is_subset(requests) && &acc != requests).then_some((id, acc.len()))
            })
            .max_by_key(|&(_, len)| len)
            .map(|(id, _)| id)
    }

    /// Add a request set, reusing an exact-match node if one exists, or
    /// else attaching a new node to the best-matching parent (storing only
    /// the delta) and deriving its index accordingly.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving delta requests through `reader` fails,
    /// or if index derivation fails.
    pub fn add_request_set(
        &mut self,
        requests: RequestSet,
        reader: &dyn Reader,
        index_timestamp: i64,
    ) -> Result<u64> {
        let target: BTreeSet<Request> = requests.iter().cloned().collect();

        if let Some(existing) = self.find_exact_match(&requests) {
            return Ok(existing);
        }

        let parent_id = self.find_best_parent(&target);

        let (added_requests, index) = match parent_id {
            Some(pid) => {
                let parent_acc = self.accumulated_requests(pid);
                let delta: RequestSet = requests
                    .iter()
                    .filter(|r| !parent_acc.contains(*r))
                    .cloned()
                    .collect();
                let delta_resources = resolve_resources(reader, &delta)?;
                let parent_index = &self
                    .nodes
                    .get(&pid)
                    .ok_or(Error::MissingNode { node_id: pid })?
                    .index;
                let index = parent_index.derive_tree(&delta_resources)?;
                (delta, index)
            }
            None => {
                let all_resources = resolve_resources(reader, &requests)?;
                let index = ResourceIndex::create(&all_resources, index_timestamp)?;
                (requests, index)
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            RequestGraphNode {
                id,
                parent_id,
                added_requests,
                index,
            },
        );
        Ok(id)
    }

    /// Rebuild every node's index from scratch by re-reading all of its
    /// accumulated requests through `reader`. Used once per build for the
    /// dependency domain, where a from-scratch rebuild is cheap enough to
    /// not bother with incremental deltas.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving any node's requests fails.
    pub fn refresh_indices(&mut self, reader: &dyn Reader, index_timestamp: i64) -> Result<()> {
        for id in self.node_ids() {
            let requests: RequestSet = self.accumulated_requests(id).into_iter().collect();
            let resources = resolve_resources(reader, &requests)?;
            let index = ResourceIndex::create(&resources, index_timestamp)?;
            if let Some(node) = self.nodes.get_mut(&id) {
                node.index = index;
            }
        }
        Ok(())
    }

    /// Incrementally update every node whose accumulated requests could
    /// plausibly cover one of `changed_paths`: re-read the current
    /// resources for that node's full request set and let the index
    /// recompute its delta.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving a node's requests fails.
    pub fn update_indices(
        &mut self,
        reader: &dyn Reader,
        changed_paths: &[String],
    ) -> Result<BTreeMap<u64, Vec<String>>> {
        let mut changed_by_node = BTreeMap::new();
        for id in self.node_ids() {
            let requests: RequestSet = self.accumulated_requests(id).into_iter().collect();
            let touches_changed = requests
                .iter()
                .any(|r| changed_paths.iter().any(|p| r.could_match(p)));
            if !touches_changed {
                continue;
            }
            let resources = resolve_resources(reader, &requests)?;
            if let Some(node) = self.nodes.get_mut(&id) {
                let delta = node.index.upsert_resources(&resources)?;
                let mut changed = delta.added;
                changed.extend(delta.updated);
                changed_by_node.insert(id, changed);
            }
        }
        Ok(changed_by_node)
    }

    /// For every node whose requests could cover a changed path, compute
    /// (without mutating the graph) how its index *would* transform:
    /// `originalSignature -> (newSignature, changedPaths)`. Used by
    /// differential builds to evaluate candidate delta signatures before
    /// committing to one.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving a node's requests fails.
    pub fn compute_deltas(
        &self,
        reader: &dyn Reader,
        changed_paths: &[String],
    ) -> Result<BTreeMap<String, (String, Vec<String>)>> {
        let mut deltas = BTreeMap::new();
        for id in self.node_ids() {
            let Some(node) = self.nodes.get(&id) else { continue };
            let requests: RequestSet = self.accumulated_requests(id).into_iter().collect();
            let touches_changed = requests
                .iter()
                .any(|r| changed_paths.iter().any(|p| r.could_match(p)));
            if !touches_changed {
                continue;
            }
            let resources = resolve_resources(reader, &requests)?;
            let derived = node.index.derive_tree(&resources)?;
            let new_signature = derived.get_signature();
            let original_signature = node.index.get_signature();
            if new_signature == original_signature {
                continue;
            }
            let changed = derived.get_added_resources(&node.index);
            deltas.insert(original_signature, (new_signature, changed));
        }
        Ok(deltas)
    }

    /// Signatures of every node's index — candidate cache keys.
    #[must_use]
    pub fn all_signatures(&self) -> Vec<String> {
        let mut ids = self.node_ids();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.nodes.get(&id).map(|n| n.index.get_signature()))
            .collect()
    }

    /// Serialize the full graph shape plus every node's index.
    #[must_use]
    pub fn to_cache_object(&self) -> RequestGraphCacheObject {
        let mut nodes: Vec<NodeCacheObject> = self
            .node_ids()
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .map(|n| NodeCacheObject {
                id: n.id,
                parent_id: n.parent_id,
                added_requests: n.added_requests.clone(),
                index: n.index.to_cache_object(),
            })
            .collect();
        nodes.sort_by_key(|n| n.id);
        RequestGraphCacheObject { nodes }
    }

    /// Restore a graph from its serializable form.
    ///
    /// # Errors
    ///
    /// Propagates [`buildcache_tree::Error`] from index restoration.
    pub fn from_cache_object(cache: &RequestGraphCacheObject) -> Result<Self> {
        let mut nodes = HashMap::new();
        for node in &cache.nodes {
            nodes.insert(
                node.id,
                RequestGraphNode {
                    id: node.id,
                    parent_id: node.parent_id,
                    added_requests: node.added_requests.clone(),
                    index: ResourceIndex::from_cache(&node.index)?,
                },
            );
        }
        let next_id = cache.nodes.iter().map(|n| n.id).max().map_or(0, |m| m + 1);
        Ok(Self { nodes, next_id })
    }
}

fn resolve_resources(reader: &dyn Reader, requests: &RequestSet) -> Result<Vec<ResourceInput>> {
    let mut by_path: BTreeMap<String, ResourceInput> = BTreeMap::new();
    for request in requests {
        let resources = match request.kind {
            crate::request::RequestKind::Path | crate::request::RequestKind::DepPath => {
                reader.by_path(&request.value)?.into_iter().collect()
            }
            crate::request::RequestKind::Patterns | crate::request::RequestKind::DepPatterns => {
                reader.by_glob(&request.value)?
            }
        };
        for resource in &resources {
            if resource.is_directory() {
                continue;
            }
            let input = ResourceInput {
                path: resource.get_path(),
                meta: ResourceMeta {
                    integrity: resource.get_integrity()?,
                    last_modified: resource.get_last_modified(),
                    size: resource.get_size(),
                    inode: resource.get_inode(),
                },
            };
            by_path.insert(input.path.clone(), input);
        }
    }
    Ok(by_path.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use buildcache_resource::{ContentParam, StatInfo};
    use std::sync::Mutex;

    struct FakeReader {
        files: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl FakeReader {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: Mutex::new(
                    files
                        .iter()
                        .map(|(p, c)| ((*p).to_string(), c.as_bytes().to_vec()))
                        .collect(),
                ),
            }
        }
    }

    impl Reader for FakeReader {
        fn by_path(&self, virtual_path: &str) -> buildcache_resource::Result<Option<buildcache_resource::Resource>> {
            let files = self.files.lock().unwrap();
            let Some(bytes) = files.get(virtual_path) else {
                return Ok(None);
            };
            let resource = buildcache_resource::Resource::new(
                virtual_path,
                ContentParam::Buffer(bytes.clone()),
                false,
                StatInfo::default(),
                None,
            )?;
            Ok(Some(resource))
        }

        fn by_glob(&self, pattern: &str) -> buildcache_resource::Result<Vec<buildcache_resource::Resource>> {
            let glob = globset::Glob::new(pattern)
                .map_err(|e| buildcache_resource::Error::invalid_pattern(pattern, e.to_string()))?
                .compile_matcher();
            let files = self.files.lock().unwrap();
            let mut out = Vec::new();
            for (path, bytes) in files.iter() {
                if glob.is_match(path) {
                    out.push(buildcache_resource::Resource::new(
                        path.clone(),
                        ContentParam::Buffer(bytes.clone()),
                        false,
                        StatInfo::default(),
                        None,
                    )?);
                }
            }
            Ok(out)
        }
    }

    #[test]
    fn exact_match_reuses_node() {
        let reader = FakeReader::new(&[("/a.js", "a")]);
        let mut graph = RequestGraph::new();
        let id1 = graph
            .add_request_set(vec![Request::path("/a.js")], &reader, 1000)
            .unwrap();
        let id2 = graph
            .add_request_set(vec![Request::path("/a.js")], &reader, 1000)
            .unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn superset_request_reuses_parent_via_delta() {
        let reader = FakeReader::new(&[("/a.js", "a"), ("/b.js", "b")]);
        let mut graph = RequestGraph::new();
        let parent = graph
            .add_request_set(vec![Request::path("/a.js")], &reader, 1000)
            .unwrap();
        let child = graph
            .add_request_set(
                vec![Request::path("/a.js"), Request::path("/b.js")],
                &reader,
                1000,
            )
            .unwrap();
        assert_ne!(parent, child);
        assert_eq!(graph.node(child).unwrap().parent_id, Some(parent));
        assert_eq!(
            graph.node(child).unwrap().added_requests,
            vec![Request::path("/b.js")]
        );
    }

    #[test]
    fn update_indices_only_touches_matching_nodes() {
        let reader = FakeReader::new(&[("/a.js", "a"), ("/b.js", "b")]);
        let mut graph = RequestGraph::new();
        graph
            .add_request_set(vec![Request::path("/a.js")], &reader, 1000)
            .unwrap();
        let node_b = graph
            .add_request_set(vec![Request::path("/b.js")], &reader, 1000)
            .unwrap();

        let changed = graph
            .update_indices(&reader, &["/b.js".to_string()])
            .unwrap();
        assert!(changed.contains_key(&node_b));
        assert_eq!(changed.len(), 1);
    }

    #[test]
    fn compute_deltas_does_not_mutate_graph() {
        let reader = FakeReader::new(&[("/a.js", "a")]);
        let mut graph = RequestGraph::new();
        graph
            .add_request_set(vec![Request::path("/a.js")], &reader, 1000)
            .unwrap();
        let sig_before = graph.all_signatures();

        let reader2 = FakeReader::new(&[("/a.js", "changed")]);
        let deltas = graph.compute_deltas(&reader2, &["/a.js".to_string()]).unwrap();
        assert_eq!(deltas.len(), 1);

        assert_eq!(graph.all_signatures(), sig_before);
    }
}
