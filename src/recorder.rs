//! Call-tree recorder
//!
//! Turns a stream of enter/leave events into a tree of call paths. The
//! recorder keeps a cursor on the innermost function believed to be running;
//! each event is O(1) apart from the child lookup, which is a hash probe.
//!
//! Immediate self-recursion (entering the node the cursor already points at)
//! only bumps a counter, so the outermost invocation's start time covers the
//! whole recursive span. Indirect recursion (A -> B -> A) produces a separate
//! path for the inner A. A reused child always gets its start time reset,
//! which never loses in-flight timing: the active calls are the cursor and
//! its ancestors, and a child of the cursor is neither. Events are not
//! validated.

use crate::call_node::{CallSiteId, CallTree, NodeId};
use crate::event::Event;
use tracing::trace;

/// Event counters collected while recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Enter events seen
    pub enters: u64,
    /// Leave events seen, including ignored ones
    pub leaves: u64,
    /// Enter events folded into the cursor as self-recursion
    pub recursive_enters: u64,
    /// Leave events that arrived before any enter
    pub ignored_leaves: u64,
}

/// Event-driven call-tree builder
#[derive(Debug, Default)]
pub struct Recorder {
    tree: CallTree,
    cursor: Option<NodeId>,
    stats: RecorderStats,
}

impl Recorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a function entry through `site` at cycle `timestamp`
    pub fn enter(&mut self, timestamp: u64, site: CallSiteId) {
        self.stats.enters += 1;

        let next = match self.cursor {
            None => self.tree.insert_root(site),
            Some(cursor) => {
                let node = self.tree.node_mut(cursor);
                if node.id() == site {
                    node.increment_recursion();
                    self.stats.recursive_enters += 1;
                    return;
                }
                match self.tree.find_child(cursor, site) {
                    Some(child) => child,
                    None => self.tree.insert_child(cursor, site),
                }
            }
        };

        self.cursor = Some(next);
        let node = self.tree.node_mut(next);
        node.set_start(timestamp);
        node.record_call();
    }

    /// Handle a return from the innermost function at cycle `timestamp`
    pub fn leave(&mut self, timestamp: u64) {
        self.stats.leaves += 1;

        let Some(cursor) = self.cursor else {
            self.stats.ignored_leaves += 1;
            trace!(timestamp, "leave before any enter ignored");
            return;
        };

        let node = self.tree.node_mut(cursor);
        if node.recursion_depth() > 0 {
            node.decrement_recursion();
            return;
        }

        node.accumulate(timestamp);
        // The root stays the cursor once exited
        if let Some(parent) = node.parent() {
            self.cursor = Some(parent);
        }
    }

    /// Dispatch a recorded event
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Enter { time, site } => self.enter(time, site),
            Event::Leave { time } => self.leave(time),
        }
    }

    /// Apply every event in order
    pub fn replay<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        for event in events {
            self.apply(event);
        }
    }

    /// Innermost active node, `None` before the first enter
    pub fn cursor(&self) -> Option<NodeId> {
        self.cursor
    }

    /// Node a final report starts from
    ///
    /// This is the cursor: the root after a balanced run, or the innermost
    /// unfinished call if the run stopped mid-stack.
    pub fn report_root(&self) -> Option<NodeId> {
        self.cursor
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Give up the recorder and keep the tree
    pub fn into_tree(self) -> CallTree {
        self.tree
    }

    /// Print a recording summary to stderr
    pub fn print_summary(&self) {
        let Some(root) = self.tree.root() else {
            eprintln!("\nNo call events recorded.");
            return;
        };

        let max_depth = self
            .tree
            .depth_first(root)
            .map(|(depth, _)| depth)
            .max()
            .unwrap_or(0);

        eprintln!("\n╔════════════════════════════════════════════════════════════╗");
        eprintln!("║  Call Tree Recording Summary                               ║");
        eprintln!("╚════════════════════════════════════════════════════════════╝");
        eprintln!();
        eprintln!("{:<40} {:>16}", "Distinct call paths", self.tree.len());
        eprintln!("{:<40} {:>16}", "Max call depth", max_depth);
        eprintln!("{:<40} {:>16}", "Enter events", self.stats.enters);
        eprintln!("{:<40} {:>16}", "Leave events", self.stats.leaves);
        eprintln!(
            "{:<40} {:>16}",
            "Self-recursive enters folded", self.stats.recursive_enters
        );
        eprintln!(
            "{:<40} {:>16}",
            "Leaves ignored (no active call)", self.stats.ignored_leaves
        );
        eprintln!(
            "{:<40} {:>16}",
            "Root cycles",
            self.tree.node(root).accumulated_time()
        );
        eprintln!("{}", "─".repeat(57));
    }
}
