use std::{future::Future, pin::Pin};

use super::{DatabaseResult, QueryResults};

/// Handshake in progress, resolving to a ready connection.
pub type ConnectFuture<C> = Pin<Box<dyn Future<Output = DatabaseResult<C>>>>;

/// Script in progress, resolving to its results and the connection it ran on.
pub type QueryFuture<C> = Pin<Box<dyn Future<Output = QueryCompletion<C>>>>;

/// Outcome of a script together with the connection it ran on.
pub struct QueryCompletion<C> {
    /// `None` when the transport broke and the connection must not be reused
    pub connection: Option<C>,
    pub outcome: DatabaseResult<QueryResults>,
}

/// Backing store reachable through non-blocking connections.
///
/// Futures returned here are never woken: the pool polls them once per
/// reactor tick, so they have to make progress on their own (on a driver
/// thread, in the kernel, ...) between polls.
pub trait Driver: 'static {
    type Connection: 'static;

    fn connect(&self) -> ConnectFuture<Self::Connection>;

    /// Run `sql`, which may contain several statements, and collect one result
    /// set per statement.
    fn execute(&self, connection: Self::Connection, sql: String) -> QueryFuture<Self::Connection>;
}
