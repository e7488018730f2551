//! Private tracker client.
//!
//! Three pieces share one authenticated session:
//! - [`SessionManager`] owns the login state and the cookie jar,
//! - [`SearchClient`] runs identifier searches over a [`SessionHandle`],
//! - [`DownloadClient`] saves a single `.torrent` file for a [`DownloadTicket`].

mod download;
mod search;
mod session;
mod types;

pub use download::DownloadClient;
pub use search::SearchClient;
pub use session::{SessionHandle, SessionManager};
pub use types::*;
