//! Call-tree nodes and the arena that owns them
//!
//! A node represents one statically distinct call path: it is created the
//! first time a given call site is reached from a given position in the
//! tree, and reused by every later call along the same path.
//!
//! Nodes live in a `CallTree` arena and refer to each other by `NodeId`.
//! The parent link is a plain index, so it never owns anything; dropping
//! the tree releases every node at once.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Opaque identity of an instrumented call site
///
/// Holds the address as a `u64` whatever the platform pointer width is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[serde(transparent)]
pub struct CallSiteId(u64);

impl CallSiteId {
    /// Wrap a raw address
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// Identity of a code pointer handed over by the instrumentation hooks
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    /// The raw address
    pub const fn address(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for CallSiteId {
    type Err = ParseIntError;

    /// Accepts `0x`-prefixed hex or plain decimal
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let address = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16)?,
            None => s.parse()?,
        };
        Ok(Self(address))
    }
}

impl From<u64> for CallSiteId {
    fn from(address: u64) -> Self {
        Self(address)
    }
}

/// Index of a node inside its `CallTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena (the root is 0)
    pub fn index(self) -> usize {
        self.0
    }
}

/// One distinct call path with its timing state
#[derive(Debug, Clone)]
pub struct CallNode {
    id: CallSiteId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    recursion_depth: u32,
    start_time: u64,
    accumulated_time: u64,
    calls: u64,
}

impl CallNode {
    fn new(id: CallSiteId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            recursion_depth: 0,
            start_time: 0,
            accumulated_time: 0,
            calls: 0,
        }
    }

    /// Call site this node stands for
    pub fn id(&self) -> CallSiteId {
        self.id
    }

    /// Enclosing call path, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child paths in first-seen order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Self-recursive entries still waiting for their leave
    pub fn recursion_depth(&self) -> u32 {
        self.recursion_depth
    }

    /// Timestamp of the latest non-recursive entry
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Total cycles spent along this path so far
    pub fn accumulated_time(&self) -> u64 {
        self.accumulated_time
    }

    /// Number of non-recursive entries into this path
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Fold one more immediate self-call into this node
    pub fn increment_recursion(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_add(1);
    }

    /// Unwind one folded self-call; stays at 0
    pub fn decrement_recursion(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }

    /// Append a child path
    pub fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Mark the start of an activation
    pub fn set_start(&mut self, time: u64) {
        self.start_time = time;
    }

    /// Add `time - start_time` to the running total
    ///
    /// A timestamp older than the start contributes nothing and the total
    /// saturates at `u64::MAX`, so it never decreases.
    pub fn accumulate(&mut self, time: u64) {
        self.accumulated_time = self
            .accumulated_time
            .saturating_add(time.saturating_sub(self.start_time));
    }

    pub(crate) fn record_call(&mut self) {
        self.calls = self.calls.saturating_add(1);
    }
}

/// Arena owning every node of one recording
#[derive(Debug, Clone, Default)]
pub struct CallTree {
    nodes: Vec<CallNode>,
    /// (parent, call site) -> child, mirrors the `children` vectors
    child_index: FnvHashMap<(NodeId, CallSiteId), NodeId>,
}

impl CallTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct call paths recorded
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first node ever created, if any
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    /// Create the root node; only valid on an empty tree
    pub fn insert_root(&mut self, id: CallSiteId) -> NodeId {
        debug_assert!(self.nodes.is_empty(), "call tree already has a root");
        self.nodes.push(CallNode::new(id, None));
        NodeId(self.nodes.len() - 1)
    }

    /// Create a node for `id` under `parent` and link it as the last child
    pub fn insert_child(&mut self, parent: NodeId, id: CallSiteId) -> NodeId {
        let child = NodeId(self.nodes.len());
        self.nodes.push(CallNode::new(id, Some(parent)));
        self.nodes[parent.0].add_child(child);
        self.child_index.insert((parent, id), child);
        child
    }

    /// Child of `parent` reached through call site `id`
    pub fn find_child(&self, parent: NodeId, id: CallSiteId) -> Option<NodeId> {
        self.child_index.get(&(parent, id)).copied()
    }

    /// Node by id
    ///
    /// # Panics
    ///
    /// If `id` was produced by a different tree and is out of range.
    pub fn node(&self, id: NodeId) -> &CallNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CallNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&CallNode> {
        self.nodes.get(id.0)
    }

    /// Depth of a node, the root being 0
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.node(id).parent();
        while let Some(parent) = current {
            depth += 1;
            current = self.node(parent).parent();
        }
        depth
    }

    /// Pre-order walk below (and including) `from`, yielding `(depth, node)`
    ///
    /// Depth is relative to `from`. Children come in first-seen order.
    pub fn depth_first(&self, from: NodeId) -> DepthFirst<'_> {
        DepthFirst {
            tree: self,
            stack: vec![(0, from)],
        }
    }
}

/// Iterator returned by [`CallTree::depth_first`]
pub struct DepthFirst<'a> {
    tree: &'a CallTree,
    stack: Vec<(usize, NodeId)>,
}

impl Iterator for DepthFirst<'_> {
    type Item = (usize, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, id) = self.stack.pop()?;
        let children = self.tree.node(id).children();
        self.stack
            .extend(children.iter().rev().map(|&child| (depth + 1, child)));
        Some((depth, id))
    }
}
