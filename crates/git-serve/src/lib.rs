//! Protocol v2 serve engine.
//!
//! Advertises capabilities, frames requests into a key section and an
//! argument section, dispatches the requested command and ships one concrete
//! command, `ls-refs`. Transports (stdio, smart HTTP) drive [`serve`] with a
//! reader, a writer and a [`ServeContext`] describing the repository.

pub mod capability;
pub mod context;
pub mod errors;
pub mod ls_refs;
pub mod pkt;
pub mod refs;
pub mod request;
pub mod serve;

pub use capability::{Advertisement, Capability, CapabilityRegistry, RegistryBuilder};
pub use context::{DEFAULT_AGENT, ServeContext};
pub use errors::ServeError;
pub use refs::{GixRefStore, MemoryRefStore, RefEntry, RefStore};
pub use request::{Cycle, RequestKeys, process_request};
pub use serve::{ServeOptions, serve};
