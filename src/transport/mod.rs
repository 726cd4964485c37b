mod endpoint;
mod http_transport;
mod retry_policy;

pub use endpoint::PreparedEndpoint;
pub use http_transport::HttpTransport;
