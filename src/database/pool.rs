use std::{
    cell::RefCell,
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

use futures::task::noop_waker_ref;
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

use super::{
    DatabaseError, DatabaseResult, QueryResults,
    driver::{ConnectFuture, Driver, QueryCompletion, QueryFuture},
};

/// Counters describing what the pool currently holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    /// Background handshakes of abandoned requests
    pub connecting: usize,
    /// Background scripts of abandoned requests
    pub processing: usize,
    pub pending: usize,
}

/// Connection pool plus the queue of submitted scripts.
///
/// Nothing happens until [`Database::update`] is called; the reactor does so
/// once per tick. Every submitted script is delivered to its
/// [`DatabaseRequest`] exactly once, unless the request is dropped first.
pub struct Database<D: Driver> {
    driver: D,
    state: Rc<RefCell<PoolState<D::Connection>>>,
}

struct PoolState<C> {
    idle: Vec<C>,
    connecting: Vec<ConnectFuture<C>>,
    processing: Vec<QueryFuture<C>>,
    /// Keyed by submission order
    pending: BTreeMap<u64, PendingRequest<C>>,
    next_id: u64,
}

struct PendingRequest<C> {
    sql: String,
    stage: Stage<C>,
    respond_to: oneshot::Sender<DatabaseResult<QueryResults>>,
}

enum Stage<C> {
    Created,
    Connecting(ConnectFuture<C>),
    Connected(C),
    Processing(QueryFuture<C>),
}

impl<D: Driver> Database<D> {
    pub fn new(driver: D) -> Database<D> {
        Self {
            driver,
            state: Rc::new(RefCell::new(PoolState {
                idle: vec![],
                connecting: vec![],
                processing: vec![],
                pending: BTreeMap::new(),
                next_id: 0,
            })),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Queue `sql` for execution. The script starts on the next update.
    pub fn submit(&self, sql: impl Into<String>) -> DatabaseRequest<D::Connection> {
        let (respond_to, receiver) = oneshot::channel();
        let mut state = self.state.borrow_mut();

        let id = state.next_id;
        state.next_id += 1;
        state.pending.insert(
            id,
            PendingRequest {
                sql: sql.into(),
                stage: Stage::Created,
                respond_to,
            },
        );
        trace!("queued database request {id}");

        DatabaseRequest {
            id,
            receiver,
            pool: Rc::downgrade(&self.state),
        }
    }

    /// Advance pending requests in submission order, then the background
    /// handshakes and scripts of abandoned requests.
    #[instrument(skip_all)]
    pub fn update(&self) {
        let mut state = self.state.borrow_mut();

        let ids: Vec<u64> = state.pending.keys().copied().collect();
        for id in ids {
            if let Some(request) = state.pending.remove(&id)
                && let Some(request) = state.advance(request, &self.driver)
            {
                state.pending.insert(id, request);
            }
        }

        state.poll_connecting();
        state.poll_processing();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.borrow();
        PoolStats {
            idle: state.idle.len(),
            connecting: state.connecting.len(),
            processing: state.processing.len(),
            pending: state.pending.len(),
        }
    }
}

impl<C: 'static> PoolState<C> {
    /// Move a request as far as it gets without blocking. Returns it back if
    /// it is still waiting on the store.
    fn advance<D>(&mut self, mut request: PendingRequest<C>, driver: &D) -> Option<PendingRequest<C>>
    where
        D: Driver<Connection = C>,
    {
        loop {
            request.stage = match std::mem::replace(&mut request.stage, Stage::Created) {
                Stage::Created => match self.idle.pop() {
                    Some(connection) => Stage::Connected(connection),
                    None => {
                        debug!("no idle database connection, opening a new one");
                        Stage::Connecting(driver.connect())
                    }
                },
                Stage::Connecting(mut connect) => match poll_now(connect.as_mut()) {
                    Poll::Pending => {
                        request.stage = Stage::Connecting(connect);
                        return Some(request);
                    }
                    Poll::Ready(Ok(connection)) => Stage::Connected(connection),
                    Poll::Ready(Err(e)) => {
                        warn!("{e}");
                        request.complete(Err(e));
                        return None;
                    }
                },
                Stage::Connected(connection) => {
                    let sql = std::mem::take(&mut request.sql);
                    Stage::Processing(driver.execute(connection, sql))
                }
                Stage::Processing(mut query) => match poll_now(query.as_mut()) {
                    Poll::Pending => {
                        request.stage = Stage::Processing(query);
                        return Some(request);
                    }
                    Poll::Ready(QueryCompletion {
                        connection,
                        outcome,
                    }) => {
                        self.recycle(connection);
                        if let Err(e) = &outcome {
                            warn!("{e}");
                        }
                        request.complete(outcome);
                        return None;
                    }
                },
            };
        }
    }

    fn poll_connecting(&mut self) {
        for mut connect in std::mem::take(&mut self.connecting) {
            match poll_now(connect.as_mut()) {
                Poll::Pending => self.connecting.push(connect),
                Poll::Ready(Ok(connection)) => {
                    trace!("background connection established");
                    self.idle.push(connection);
                }
                Poll::Ready(Err(e)) => warn!("background connection failed: {e}"),
            }
        }
    }

    fn poll_processing(&mut self) {
        for mut query in std::mem::take(&mut self.processing) {
            match poll_now(query.as_mut()) {
                Poll::Pending => self.processing.push(query),
                Poll::Ready(QueryCompletion {
                    connection,
                    outcome,
                }) => {
                    if let Err(e) = outcome {
                        debug!("abandoned query failed: {e}");
                    }
                    self.recycle(connection);
                }
            }
        }
    }

    fn recycle(&mut self, connection: Option<C>) {
        match connection {
            Some(connection) => self.idle.push(connection),
            None => debug!("dropping broken database connection"),
        }
    }

    /// Unlink a request whose handle went away, keeping its in-flight work
    /// alive in the background sets.
    fn abandon(&mut self, id: u64) {
        let Some(request) = self.pending.remove(&id) else {
            return;
        };

        trace!("database request {id} abandoned");
        match request.stage {
            Stage::Created => {}
            Stage::Connecting(connect) => self.connecting.push(connect),
            Stage::Connected(connection) => self.idle.push(connection),
            Stage::Processing(query) => self.processing.push(query),
        }
    }
}

impl<C> PendingRequest<C> {
    fn complete(self, outcome: DatabaseResult<QueryResults>) {
        // the receiver is only gone if the handle could not unlink itself
        let _ = self.respond_to.send(outcome);
    }
}

/// Poll once without registering interest in a wakeup.
fn poll_now<F: Future + ?Sized>(future: Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(noop_waker_ref());
    future.poll(&mut cx)
}

/// Handle to a submitted script.
///
/// Resolves once [`Database::update`] has seen the script finish. Dropping
/// the handle early abandons the request: whatever handshake or statement is
/// in flight keeps running in the background and its connection returns to
/// the pool afterwards.
pub struct DatabaseRequest<C: 'static> {
    id: u64,
    receiver: oneshot::Receiver<DatabaseResult<QueryResults>>,
    pool: Weak<RefCell<PoolState<C>>>,
}

impl<C: 'static> Future for DatabaseRequest<C> {
    type Output = DatabaseResult<QueryResults>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DatabaseError::Closed)))
    }
}

impl<C: 'static> Drop for DatabaseRequest<C> {
    fn drop(&mut self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        // while the pool is busy the request simply runs to completion
        if let Ok(mut state) = pool.try_borrow_mut() {
            state.abandon(self.id);
        }
    }
}
