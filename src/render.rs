//! Call-tree report rendering
//!
//! Both output modes walk the tree depth-first, pre-order, children in
//! first-seen order, and resolve every node's call site once per render.
//! By default a node whose call site cannot be resolved is dropped together
//! with its whole subtree, even if descendants would resolve.
//!
//! Text mode, one block per node, indented with one tab per level:
//!
//! ```text
//! Function Name: main
//! Cycles in Function: 1200
//!
//! 	Function Name: parse
//! 	Cycles in Function: 300
//! ```
//!
//! Structured mode produces nested [`ReportNode`] objects serialized as JSON.

use crate::call_node::{CallNode, CallTree, NodeId};
use crate::config::ReportFormat;
use crate::error::Result;
use crate::symbols::SymbolResolver;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// What to do with a node whose call site has no name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Omit the node and all of its descendants
    #[default]
    Prune,
    /// Render `<unresolved ADDR>` and keep descending
    Placeholder,
}

/// One node of the structured report
///
/// Building and dropping a report never recurse, so any depth is fine.
/// Serializing through serde recurses once per level; `Renderer::render_json`
/// writes the same document without that limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportNode {
    #[serde(rename = "Function Name")]
    pub name: String,
    #[serde(rename = "Cycles")]
    pub cycles: u64,
    #[serde(rename = "Calls")]
    pub calls: u64,
    #[serde(rename = "Children")]
    pub children: Vec<ReportNode>,
}

impl Drop for ReportNode {
    fn drop(&mut self) {
        // Flatten first so each node drops with no children left
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Partially built report node and the next child to visit
struct Pending {
    id: NodeId,
    report: ReportNode,
    next_child: usize,
}

/// Work item of the iterative JSON writer
enum JsonStep<'a> {
    /// Object whose opening brace sits at `indent` levels
    Node(&'a ReportNode, usize),
    Separator,
    /// Close the `Children` array and object opened at `indent`
    Close(usize),
}

const SPACES: [u8; 256] = [b' '; 256];

fn write_indent<W: Write>(out: &mut W, mut width: usize) -> io::Result<()> {
    while width > 0 {
        let chunk = width.min(SPACES.len());
        out.write_all(&SPACES[..chunk])?;
        width -= chunk;
    }
    Ok(())
}

/// Pretty JSON of a report, two-space indent, no recursion
fn write_report_json<W: Write>(report: &ReportNode, out: &mut W) -> Result<()> {
    let mut steps = vec![JsonStep::Node(report, 0)];

    while let Some(step) = steps.pop() {
        match step {
            JsonStep::Node(node, indent) => {
                let pad = indent * 2;
                let field = pad + 2;
                write_indent(out, pad)?;
                out.write_all(b"{\n")?;
                write_indent(out, field)?;
                out.write_all(b"\"Function Name\": ")?;
                serde_json::to_writer(&mut *out, &node.name)?;
                out.write_all(b",\n")?;
                write_indent(out, field)?;
                writeln!(out, "\"Cycles\": {},", node.cycles)?;
                write_indent(out, field)?;
                writeln!(out, "\"Calls\": {},", node.calls)?;
                write_indent(out, field)?;

                if node.children.is_empty() {
                    out.write_all(b"\"Children\": []\n")?;
                    write_indent(out, pad)?;
                    out.write_all(b"}")?;
                    continue;
                }

                out.write_all(b"\"Children\": [\n")?;
                steps.push(JsonStep::Close(indent));
                for (index, child) in node.children.iter().enumerate().rev() {
                    steps.push(JsonStep::Node(child, indent + 2));
                    if index > 0 {
                        steps.push(JsonStep::Separator);
                    }
                }
            }
            JsonStep::Separator => out.write_all(b",\n")?,
            JsonStep::Close(indent) => {
                out.write_all(b"\n")?;
                write_indent(out, indent * 2 + 2)?;
                out.write_all(b"]\n")?;
                write_indent(out, indent * 2)?;
                out.write_all(b"}")?;
            }
        }
    }

    Ok(())
}

/// Renders a call tree through a symbol resolver
pub struct Renderer<'r, R: SymbolResolver + ?Sized> {
    resolver: &'r R,
    unresolved: UnresolvedPolicy,
}

impl<'r, R: SymbolResolver + ?Sized> Renderer<'r, R> {
    /// Renderer with the default (pruning) policy
    pub fn new(resolver: &'r R) -> Self {
        Self {
            resolver,
            unresolved: UnresolvedPolicy::default(),
        }
    }

    pub fn with_policy(mut self, unresolved: UnresolvedPolicy) -> Self {
        self.unresolved = unresolved;
        self
    }

    fn name_of(&self, node: &CallNode) -> Option<String> {
        match (self.resolver.resolve(node.id()), self.unresolved) {
            (Some(name), _) => Some(name),
            (None, UnresolvedPolicy::Prune) => None,
            (None, UnresolvedPolicy::Placeholder) => Some(format!("<unresolved {}>", node.id())),
        }
    }

    /// Write the indented text report of the subtree at `from`
    pub fn render_text<W: Write>(&self, tree: &CallTree, from: NodeId, out: &mut W) -> io::Result<()> {
        let mut stack = vec![(from, 0usize)];

        while let Some((id, depth)) = stack.pop() {
            let node = tree.node(id);
            let Some(name) = self.name_of(node) else {
                continue;
            };

            let indent = "\t".repeat(depth);
            writeln!(out, "{}Function Name: {}", indent, name)?;
            writeln!(out, "{}Cycles in Function: {}", indent, node.accumulated_time())?;
            writeln!(out)?;

            stack.extend(node.children().iter().rev().map(|&child| (child, depth + 1)));
        }

        Ok(())
    }

    /// Text report as a string
    pub fn text_string(&self, tree: &CallTree, from: NodeId) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.render_text(tree, from, &mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Structured report of the subtree at `from`, `None` if `from` is pruned
    pub fn render_structured(&self, tree: &CallTree, from: NodeId) -> Option<ReportNode> {
        let mut stack = vec![self.pending(tree, from)?];

        loop {
            let top = stack.last_mut()?;
            let children = tree.node(top.id).children();

            if let Some(&child) = children.get(top.next_child) {
                top.next_child += 1;
                if let Some(pending) = self.pending(tree, child) {
                    stack.push(pending);
                }
                continue;
            }

            let done = stack.pop()?.report;
            match stack.last_mut() {
                Some(parent) => parent.report.children.push(done),
                None => return Some(done),
            }
        }
    }

    fn pending(&self, tree: &CallTree, id: NodeId) -> Option<Pending> {
        let node = tree.node(id);
        let name = self.name_of(node)?;
        Some(Pending {
            id,
            report: ReportNode {
                name,
                cycles: node.accumulated_time(),
                calls: node.calls(),
                children: Vec::new(),
            },
            next_child: 0,
        })
    }

    /// Write the structured report as pretty JSON (`null` if pruned)
    pub fn render_json<W: Write>(&self, tree: &CallTree, from: NodeId, out: &mut W) -> Result<()> {
        match self.render_structured(tree, from) {
            Some(report) => write_report_json(&report, out)?,
            None => write!(out, "null")?,
        }
        writeln!(out)?;
        Ok(())
    }

    /// Render in the requested format
    pub fn render<W: Write>(
        &self,
        format: ReportFormat,
        tree: &CallTree,
        from: NodeId,
        out: &mut W,
    ) -> Result<()> {
        match format {
            ReportFormat::Text => self.render_text(tree, from, out)?,
            ReportFormat::Json => self.render_json(tree, from, out)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_node::CallSiteId;
    use crate::recorder::Recorder;
    use crate::symbols::SymbolTable;

    const A: CallSiteId = CallSiteId::new(0xa);
    const B: CallSiteId = CallSiteId::new(0xb);
    const C: CallSiteId = CallSiteId::new(0xc);
    const D: CallSiteId = CallSiteId::new(0xd);

    /// A(0..100) { B(10..30), B(40..60) { C(45..50) }, D(70..90) }
    fn sample_recorder() -> Recorder {
        let mut recorder = Recorder::new();
        recorder.enter(0, A);
        recorder.enter(10, B);
        recorder.leave(30);
        recorder.enter(40, B);
        recorder.enter(45, C);
        recorder.leave(50);
        recorder.leave(60);
        recorder.enter(70, D);
        recorder.leave(90);
        recorder.leave(100);
        recorder
    }

    fn all_names() -> SymbolTable {
        vec![(A, "main"), (B, "parse"), (C, "lex"), (D, "emit")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_text_report_layout() {
        let recorder = sample_recorder();
        let table = all_names();
        let root = recorder.report_root().unwrap();
        let text = Renderer::new(&table).text_string(recorder.tree(), root);

        let expected = "Function Name: main\n\
                        Cycles in Function: 100\n\
                        \n\
                        \tFunction Name: parse\n\
                        \tCycles in Function: 40\n\
                        \n\
                        \t\tFunction Name: lex\n\
                        \t\tCycles in Function: 5\n\
                        \n\
                        \tFunction Name: emit\n\
                        \tCycles in Function: 20\n\
                        \n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_text_prunes_unresolved_subtree() {
        let recorder = sample_recorder();
        let table: SymbolTable = vec![(A, "main"), (C, "lex"), (D, "emit")]
            .into_iter()
            .collect();
        let root = recorder.report_root().unwrap();
        let text = Renderer::new(&table).text_string(recorder.tree(), root);

        assert!(text.contains("main"));
        assert!(text.contains("emit"));
        // lex resolves but lives under the unresolved parse node
        assert!(!text.contains("lex"));
        assert!(!text.contains("parse"));
    }

    #[test]
    fn test_unresolved_root_renders_nothing() {
        let recorder = sample_recorder();
        let table = SymbolTable::new();
        let root = recorder.report_root().unwrap();
        let renderer = Renderer::new(&table);

        assert_eq!(renderer.text_string(recorder.tree(), root), "");
        assert_eq!(renderer.render_structured(recorder.tree(), root), None);

        let mut out = Vec::new();
        renderer.render_json(recorder.tree(), root, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "null");
    }

    #[test]
    fn test_placeholder_keeps_unresolved_nodes() {
        let recorder = sample_recorder();
        let table: SymbolTable = vec![(A, "main"), (C, "lex")].into_iter().collect();
        let root = recorder.report_root().unwrap();
        let text = Renderer::new(&table)
            .with_policy(UnresolvedPolicy::Placeholder)
            .text_string(recorder.tree(), root);

        assert!(text.contains("\tFunction Name: <unresolved 0xb>\n"));
        assert!(text.contains("\t\tFunction Name: lex\n"));
        assert!(text.contains("\tFunction Name: <unresolved 0xd>\n"));
    }

    #[test]
    fn test_structured_report_shape() {
        let recorder = sample_recorder();
        let table = all_names();
        let root = recorder.report_root().unwrap();
        let report = Renderer::new(&table)
            .render_structured(recorder.tree(), root)
            .unwrap();

        assert_eq!(report.name, "main");
        assert_eq!(report.cycles, 100);
        assert_eq!(report.calls, 1);
        assert_eq!(report.children.len(), 2);
        assert_eq!(report.children[0].name, "parse");
        assert_eq!(report.children[0].calls, 2);
        assert_eq!(report.children[0].children[0].name, "lex");
        assert_eq!(report.children[1].name, "emit");
    }

    #[test]
    fn test_json_uses_report_field_names() {
        let recorder = sample_recorder();
        let table = all_names();
        let root = recorder.report_root().unwrap();
        let mut out = Vec::new();
        Renderer::new(&table)
            .render(ReportFormat::Json, recorder.tree(), root, &mut out)
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["Function Name"], "main");
        assert_eq!(value["Cycles"], 100);
        assert_eq!(value["Children"][0]["Children"][0]["Cycles"], 5);
    }

    #[test]
    fn test_json_matches_serde_pretty_output() {
        let recorder = sample_recorder();
        let table: SymbolTable = vec![(A, "main"), (B, "parse \"quoted\""), (C, "lex"), (D, "emit")]
            .into_iter()
            .collect();
        let root = recorder.report_root().unwrap();
        let renderer = Renderer::new(&table);

        let mut out = Vec::new();
        renderer.render_json(recorder.tree(), root, &mut out).unwrap();

        let report = renderer.render_structured(recorder.tree(), root).unwrap();
        let expected = format!("{}\n", serde_json::to_string_pretty(&report).unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    /// Counts bytes and report entries without keeping the output
    #[derive(Default)]
    struct CountingWriter {
        bytes: usize,
        names: usize,
    }

    impl Write for CountingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes += buf.len();
            if matches!(buf.first(), Some(b' ' | b'\t')) {
                return Ok(buf.len());
            }
            self.names += buf.windows(14).filter(|w| *w == b"Function Name:").count();
            self.names += buf.windows(15).filter(|w| *w == b"\"Function Name\"").count();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn deep_chain(depth: u64) -> Recorder {
        let mut recorder = Recorder::new();
        for level in 0..depth {
            recorder.enter(level, CallSiteId::new(0x1000 + level));
        }
        for level in 0..depth {
            recorder.leave(depth + level);
        }
        recorder
    }

    #[test]
    fn test_deep_chain_structured_report() {
        let depth = 100_000;
        let recorder = deep_chain(depth);
        let root = recorder.report_root().unwrap();

        let report = Renderer::new(&crate::symbols::AddressResolver)
            .render_structured(recorder.tree(), root)
            .unwrap();

        let mut levels = 1;
        let mut node = &report;
        while let Some(child) = node.children.first() {
            assert!(child.children.len() <= 1);
            node = child;
            levels += 1;
        }
        assert_eq!(levels, depth);
        assert_eq!(node.name, format!("{:#x}", 0x1000 + depth - 1));
        drop(report);
    }

    #[test]
    fn test_deep_chain_text_and_json_output() {
        // Indentation makes output quadratic in depth, so stay moderate here
        let depth = 10_000;
        let recorder = deep_chain(depth);
        let root = recorder.report_root().unwrap();
        let renderer = Renderer::new(&crate::symbols::AddressResolver);

        let mut text = CountingWriter::default();
        renderer.render_text(recorder.tree(), root, &mut text).unwrap();
        assert_eq!(text.names, depth as usize);

        let mut json = CountingWriter::default();
        renderer.render_json(recorder.tree(), root, &mut json).unwrap();
        assert_eq!(json.names, depth as usize);
        assert!(json.bytes > text.bytes);
    }

    #[test]
    fn test_render_from_inner_node() {
        let mut recorder = Recorder::new();
        recorder.enter(0, A);
        recorder.enter(10, B);
        recorder.enter(20, C);
        recorder.leave(25);
        // Stopped while B is still running
        let table = all_names();
        let from = recorder.report_root().unwrap();
        let text = Renderer::new(&table).text_string(recorder.tree(), from);

        assert!(text.starts_with("Function Name: parse\n"));
        assert!(text.contains("\tFunction Name: lex\n"));
        assert!(!text.contains("main"));
    }
}
