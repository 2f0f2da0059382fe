//! Git Smart HTTP (protocol v2) transport for the serve engine.
//!
//! `GET …/info/refs` sends the capability advertisement; `POST
//! …/git-upload-pack` runs exactly one stateless request against the
//! repository. Push is refused.

pub mod errors;
pub mod repo;
pub mod state;
pub mod v2;

pub use errors::GitHttpError;
pub use repo::{DirectoryStorage, RepositoryProvider};
pub use state::{GitHttpState, HttpSettings, ServeState};
pub use v2::router;
