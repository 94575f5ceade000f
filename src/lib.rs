//! # cvsr - CVS client/server protocol client
//!
//! cvsr speaks the CVS client/server protocol: it opens a connection to a
//! repository, describes a local working copy with a stream of requests,
//! sends file contents inline, and applies the server's responses back to
//! the working copy and its `CVS/` metadata.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cvsr::{BasicCommand, Config, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.cvsroot = Some(":pserver:anonymous@cvs.example.org:/cvsroot".into());
//!     config.local_path = "./checkout".into();
//!
//!     let mut session = Session::from_config(&config)?;
//!     session.execute(&BasicCommand::new("update").option("-d")).await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Driving the protocol directly
//!
//! ```rust,ignore
//! use cvsr::protocol::Request;
//!
//! session.process_requests(vec![
//!     Request::Directory { local: ".".into(), repository: "/cvsroot/module".into() },
//!     Request::Argument("a.txt".into()),
//!     Request::Command("status".into()),
//! ]).await?;
//! ```

pub mod admin;
pub mod callbacks;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod exclusion;
pub mod file;
pub mod logging;
pub mod planner;
pub mod protocol;
pub mod session;

// Re-export commonly used types and functions
pub use admin::{AdminStore, Entry, LastKnownState, StandardAdminStore};
pub use callbacks::{CallbackBuilder, ClientCallbacks, ClientEvent};
pub use command::BasicCommand;
pub use config::{Config, GlobalOptions};
pub use connection::{connect, Connection, CvsRoot};
pub use error::{AdminError, ClientError, ConnectionError};
pub use planner::SyncPlanner;
pub use session::{AbortHandle, Session};

// vim: ts=4
