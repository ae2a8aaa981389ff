//! # Groonga Client
//!
//! Async client for the [Groonga](https://groonga.org) full-text search
//! server over GQTP, its binary TCP protocol.
//!
//! ## Features
//!
//! - **Typed responses** - `select` replies decode into records and drilldowns
//! - **HTTP-compatible output** - replies are rendered in the same JSON/XML
//!   envelope the HTTP interface returns
//! - **Pluggable transport** - swap the TCP transport for anything that
//!   implements [`Transport`]
//!
//! ## Example
//! ```no_run
//! use groonga_client::{Command, Connection, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut connection = Connection::connect("localhost", 10043).await?;
//!
//!     let command = Command::new("select")
//!         .with_argument("table", "Entries")
//!         .with_argument("drilldown", "tag");
//!     let response = connection.send(&command).await?;
//!
//!     if let Some(select) = response.as_select() {
//!         println!("{} hits", select.n_hits());
//!         for drilldown in select.drilldowns() {
//!             println!("{}: {} groups", drilldown.name(), drilldown.n_hits());
//!         }
//!     }
//!
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

mod command;
pub mod config;
mod connection;
mod error;
mod raw_response;
pub mod response;
pub mod transport;

pub use command::{Command, OutputType};
pub use config::ClientConfig;
pub use connection::{CloseHandle, Connection};
pub use error::Error;
pub use raw_response::{PendingResponse, RawResponse};
pub use response::{
    decode, BaseResponse, Column, ColumnType, Drilldown, Record, Response, ResponseHeader,
    SelectResponse, Value,
};
pub use transport::{GqtpTransport, Reply, Transport, TransportError};

/// Custom result type for Groonga client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Re-export of the `bytes` crate for convenience
pub use bytes;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "test");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));

        let json_error = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }
}
