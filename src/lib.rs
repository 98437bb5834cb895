//! calltree - Instrumented call-tree profiler
//!
//! This library records function entry/exit events into a tree of distinct
//! call paths, accumulates hardware cycle counts per path, and renders the
//! tree as an indented text report or a JSON document with symbolized
//! function names.
//!
//! ```
//! use calltree::{CallSiteId, Recorder, Renderer, SymbolTable};
//!
//! let main = CallSiteId::new(0x1000);
//! let work = CallSiteId::new(0x2000);
//!
//! let mut recorder = Recorder::new();
//! recorder.enter(0, main);
//! recorder.enter(10, work);
//! recorder.leave(30);
//! recorder.leave(100);
//!
//! let names: SymbolTable = vec![(main, "main"), (work, "work")].into_iter().collect();
//! let root = recorder.report_root().unwrap();
//! let report = Renderer::new(&names).text_string(recorder.tree(), root);
//! assert!(report.contains("\tFunction Name: work\n\tCycles in Function: 20\n"));
//! ```

pub mod call_node;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod hooks;
pub mod lifecycle;
pub mod recorder;
pub mod render;
pub mod symbols;

pub use call_node::{CallNode, CallSiteId, CallTree, NodeId};
pub use config::{ProfilerConfig, ReportFormat};
pub use error::{ProfilerError, Result};
pub use event::{Event, EventLog};
pub use lifecycle::{ReportGuard, ReportSink};
pub use recorder::{Recorder, RecorderStats};
pub use render::{Renderer, ReportNode, UnresolvedPolicy};
pub use symbols::{AddressResolver, DwarfResolver, ProcessResolver, SymbolResolver, SymbolTable};
