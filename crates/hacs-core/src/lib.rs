pub mod error;
pub mod lock;
pub mod model;
pub mod registry;
pub mod store;
pub mod validate;
pub mod version;

pub use error::{ErrorContext, HacsError};
pub use model::{Category, MetadataUpdate, Repository, RepositoryManifest, Status};
pub use registry::Registry;

pub type HacsResult<T> = std::result::Result<T, HacsError>;
