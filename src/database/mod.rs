//! Non-blocking connection pool for the backing store
//!
//! Scripts are submitted with [`Database::submit`] and advanced by
//! [`Database::update`], which the server calls on every reactor tick. A
//! request moves through four stages:
//!
//! 1. **created**: waits for an idle connection or opens a new one
//! 2. **connecting**: the handshake is polled until it succeeds or fails
//! 3. **connected**: the script is handed to the driver
//! 4. **processing**: the script is polled until every result set arrived
//!
//! and is then removed from the queue, its result delivered to the
//! [`DatabaseRequest`] handle. Dropping the handle earlier does not tear down
//! the connection: the handshake or script finishes in the background and the
//! connection goes back to the idle set.

mod driver;
mod error;
mod pool;
mod results;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use driver::{ConnectFuture, Driver, QueryCompletion, QueryFuture};
pub use error::{DatabaseError, DatabaseResult};
pub use pool::{Database, DatabaseRequest, PoolStats};
pub use results::{QueryResults, ResultSet};
