pub mod error;
pub mod trace;
pub mod types;

pub use error::{Error, ErrorInfo, ErrorKind, Result};
pub use trace::{TraceContext, TraceId};
pub use types::{
    AccountRequest, BatchRequest, BatchResponse, ControlProgram, SubRequest, SubResponse,
    WireError,
};
