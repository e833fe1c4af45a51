use glam::Mat4;
use log::warn;

use super::{NodeKind, ParamList, PrimvarSet, RetainedScene, Topology};
use crate::utils::allocator::{Arena, NodeId};

/// Everything the renderer was told about one node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub name: String,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub topology: Option<Topology>,
    pub primvars: PrimvarSet,
    pub params: ParamList,
    pub material: Option<String>,
    pub transform_times: Vec<f32>,
    pub transforms: Vec<Mat4>,
    pub coordinate_systems: Vec<NodeId>,
}

impl NodeRecord {
    fn new(kind: NodeKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            parents: Vec::new(),
            children: Vec::new(),
            topology: None,
            primvars: PrimvarSet::new(),
            params: ParamList::new(),
            material: None,
            transform_times: Vec::new(),
            transforms: Vec::new(),
            coordinate_systems: Vec::new(),
        }
    }
}

/// In-memory retained scene that records every call.
#[derive(Debug)]
pub struct RecordingScene {
    nodes: Arena<NodeRecord, NodeId>,
    root: NodeId,
    mutations: usize,
}

impl Default for RecordingScene {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingScene {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = nodes.insert(NodeRecord::new(NodeKind::Group, "root"));
        Self {
            nodes,
            root,
            mutations: 0,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn find(&self, name: &str) -> Option<(NodeId, &NodeRecord)> {
        self.nodes.iter().find(|(_, node)| node.name == name)
    }

    pub fn is_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.nodes
            .get(parent)
            .map(|node| node.children.contains(&child))
            .unwrap_or(false)
    }

    pub fn children(&self, parent: NodeId) -> &[NodeId] {
        self.nodes
            .get(parent)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of mutating calls received so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    fn with_node<F>(&mut self, node: NodeId, op: &str, f: F)
    where
        F: FnOnce(&mut NodeRecord),
    {
        self.mutations += 1;
        match self.nodes.get_mut(node) {
            Some(record) => f(record),
            None => warn!("{op} on missing node {node:?}"),
        }
    }
}

impl RetainedScene for RecordingScene {
    fn root(&self) -> NodeId {
        self.root
    }

    fn create_node(&mut self, kind: NodeKind, name: &str) -> NodeId {
        self.mutations += 1;
        self.nodes.insert(NodeRecord::new(kind, name))
    }

    fn destroy_node(&mut self, node: NodeId) {
        self.mutations += 1;
        if node == self.root {
            warn!("refusing to destroy the root node");
            return;
        }
        let Some(record) = self.nodes.remove(node) else {
            warn!("destroy of missing node {node:?}");
            return;
        };
        for parent in record.parents {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|c| *c != node);
            }
        }
        for child in record.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parents.retain(|p| *p != node);
            }
        }
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.mutations += 1;
        if !self.nodes.contains(parent) || !self.nodes.contains(child) {
            warn!("add_child with missing node {parent:?} -> {child:?}");
            return;
        }
        if let Some(record) = self.nodes.get_mut(parent) {
            if !record.children.contains(&child) {
                record.children.push(child);
            }
        }
        if let Some(record) = self.nodes.get_mut(child) {
            if !record.parents.contains(&parent) {
                record.parents.push(parent);
            }
        }
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.with_node(parent, "remove_child", |record| {
            record.children.retain(|c| *c != child)
        });
        if let Some(record) = self.nodes.get_mut(child) {
            record.parents.retain(|p| *p != parent);
        }
    }

    fn define_topology(&mut self, node: NodeId, topology: &Topology) {
        self.with_node(node, "define_topology", |record| {
            record.topology = Some(topology.clone())
        });
    }

    fn set_primvars(&mut self, node: NodeId, primvars: &PrimvarSet) {
        self.with_node(node, "set_primvars", |record| {
            record.primvars = primvars.clone()
        });
    }

    fn clear_primvars(&mut self, node: NodeId) {
        self.with_node(node, "clear_primvars", |record| {
            record.primvars = PrimvarSet::new()
        });
    }

    fn set_params(&mut self, node: NodeId, params: &ParamList) {
        self.with_node(node, "set_params", |record| record.params = params.clone());
    }

    fn set_material(&mut self, node: NodeId, material: Option<&str>) {
        self.with_node(node, "set_material", |record| {
            record.material = material.map(str::to_string)
        });
    }

    fn set_transform(&mut self, node: NodeId, transform: Mat4) {
        self.with_node(node, "set_transform", |record| {
            record.transform_times = vec![0.0];
            record.transforms = vec![transform];
        });
    }

    fn set_transform_samples(&mut self, node: NodeId, times: &[f32], transforms: &[Mat4]) {
        self.with_node(node, "set_transform_samples", |record| {
            record.transform_times = times.to_vec();
            record.transforms = transforms.to_vec();
        });
    }

    fn attach_coordinate_system(&mut self, node: NodeId, coordsys: NodeId) {
        self.with_node(node, "attach_coordinate_system", |record| {
            if !record.coordinate_systems.contains(&coordsys) {
                record.coordinate_systems.push(coordsys);
            }
        });
    }

    fn detach_coordinate_system(&mut self, node: NodeId, coordsys: NodeId) {
        self.with_node(node, "detach_coordinate_system", |record| {
            record.coordinate_systems.retain(|c| *c != coordsys)
        });
    }
}
