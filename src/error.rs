//! Startup failures. Anything here ends the process with a non-zero status.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not create data directory {_0}")]
    DataDir(#[error(not(source))] String),
    #[display("could not set up logging")]
    Logging,
    #[display("could not open database")]
    Database,
    #[display("could not set up API client")]
    Client,
    #[display("terminal error")]
    Terminal,
}
