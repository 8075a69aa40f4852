mod body;
pub mod content_discovery;
pub mod manifest;
mod request_ext;
mod response_ext;

pub use body::Body;
pub use request_ext::RequestExt;
pub use response_ext::ResponseExt;

pub const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";
pub const DOCKER_DISTRIBUTION_API_VERSION: &str = "Docker-Distribution-API-Version";
pub const OCI_FILTERS_APPLIED: &str = "OCI-Filters-Applied";
pub const OCI_SUBJECT: &str = "OCI-Subject";
pub const ORAS_API_VERSION: &str = "ORAS-Api-Version";
