pub mod client;
pub mod error;
pub mod github;
pub mod http_client;
pub mod name;

pub use client::{ReleaseInfo, RemoteMetadataClient, RepositoryInfo};
pub use error::{ClientError, ClientResult};
pub use github::GithubClient;
