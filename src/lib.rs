//! flowgraph: reusable task graphs with dynamic subflows
//!
//! A [`Framework`] is a persistent task-dependency graph. An [`Executor`]
//! runs it on a pool of worker threads as often as needed, deriving fresh
//! dependency counters for every run. Tasks may build nested subflows
//! while they run; those subflows live only for the run that created them.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use flowgraph::{Executor, Framework, GraphBuilder};
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let mut flow = Framework::with_name("example");
//!
//! let counter = hits.clone();
//! let a = flow.emplace(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//! let counter = hits.clone();
//! let b = flow.emplace_subflow(move |subflow| {
//!     for _ in 0..3 {
//!         let counter = counter.clone();
//!         subflow.emplace(move || {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         });
//!     }
//! });
//! flow.precede(a, [b]).unwrap();
//!
//! let executor = Executor::new(4).unwrap();
//! executor.run(&flow).wait().unwrap();
//! assert_eq!(hits.load(Ordering::SeqCst), 4);
//! ```

#![doc(html_root_url = "https://docs.rs/flowgraph")]
#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};

pub use runtime::dag::{Graph, GraphBuilder, GraphError, Node, NodeId, TaskResult, Work};
pub use runtime::errors::{ExecutorError, RunError};
pub use runtime::framework::{Framework, Subflow};
pub use runtime::scheduler::{Executor, ExecutorStats, RunFuture, RunGroup, RunResult};
pub use util::config::{ConfigError, ExecutorConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
