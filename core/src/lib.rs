pub mod config;
pub mod context;
pub mod errors;
pub mod history;
pub mod mutators;
pub mod reconcile;
pub mod report;
pub mod storage;
pub mod supervisor;

pub use context::{ClientConfig, ConnectionReport, OperatorContext};
pub use errors::{CoreError, ErrorKind, FileError, SessionError};
