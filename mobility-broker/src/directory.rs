//! The Service Directory (§4.D): an insertion-ordered mapping from service
//! name to descriptor, built once at `setup` and immutable for the run.

use std::collections::HashMap;

use mobility_wire::ServiceSpec;

/// A known simulator service, its endpoint, and its declared event protocol
/// (§3 "Service Descriptor").
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub endpoint: String,
    pub spec: ServiceSpec,
    pub writer_url: Option<String>,
}

/// Insertion-ordered service directory (§4.D).
///
/// Iteration order is the directory's insertion order, which doubles as the
/// tie-break when two services report the same peek time (§4.F, §9 Open
/// Questions: "directory insertion order").
#[derive(Debug, Clone, Default)]
pub struct Directory {
    order: Vec<String>,
    by_name: HashMap<String, ServiceDescriptor>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a descriptor, preserving insertion order. Replacing an
    /// existing name keeps its original position (setup never re-adds a
    /// name once negotiated, so this only matters for test fixtures).
    pub fn insert(&mut self, descriptor: ServiceDescriptor) {
        if !self.by_name.contains_key(&descriptor.name) {
            self.order.push(descriptor.name.clone());
        }
        self.by_name.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates descriptors in directory (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.order.iter().map(|name| &self.by_name[name])
    }

    /// The insertion index of `name`, used as the peek tie-break key.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }
}
