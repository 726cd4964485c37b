pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod stream;
pub mod transport;

mod util;

pub use error::{AdapterError, ApiError, ErrorCategory};
pub use model::{GenerateResult, ResponsesModel, StreamResult};
