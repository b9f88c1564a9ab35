//! Cross-file schema construction.
//!
//! A [`Loader`] supplies source text by logical path. [`build`] follows
//! imports from a set of entry files, registers every message, enum, extend
//! and service under its fully qualified path, and resolves type references
//! by walking enclosing scopes outward. [`revalidate`] rebuilds only what
//! changed, and [`SharedSchema`] publishes the results of concurrent
//! updates.

mod builder;
mod loader;
mod locate;
pub mod resolve;
mod shared;

pub use builder::{build, build_with, merge, revalidate, BuildOptions};
pub use loader::{ChainLoader, FsLoader, LoadedFile, Loader, MemoryLoader};
pub use locate::{Located, Node};
pub use shared::{SharedSchema, UpdateTicket};
