//! The collector endpoint
//!
//! [`Server`] runs on a single thread. Every accepted socket becomes a local
//! task that serves exactly one request (see [`connection`]). A fixed ticker
//! lets the storage make progress on its outstanding work.
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use metrics_collector::{
//!     config::read_config_file,
//!     mail::{LogMailTransport, QueuedMailManager},
//!     server::Server,
//!     storage::MemoryMonitoringStorage,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Rc::new(read_config_file("collector.json")?);
//!     let mail = Rc::new(QueuedMailManager::start(LogMailTransport)?);
//!
//!     let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//!     let local = tokio::task::LocalSet::new();
//!     local.block_on(&runtime, async move {
//!         let server = Server::bind(config, Rc::new(MemoryMonitoringStorage::new()), mail).await?;
//!         server.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//!         anyhow::Ok(())
//!     })
//! }
//! ```

pub mod connection;
pub mod protocol;

use std::{future::Future, net::SocketAddr, rc::Rc, time::Duration};

use tokio::{
    net::TcpListener,
    task::JoinSet,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

use crate::{config::Config, mail::MailManager, storage::MonitoringStorage};
use connection::Connection;

/// How often the storage gets to advance its outstanding requests.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Collaborators every connection needs.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) config: Rc<Config>,
    pub(crate) storage: Rc<dyn MonitoringStorage>,
    pub(crate) mail: Rc<dyn MailManager>,
}

pub struct Server {
    listener: TcpListener,
    shared: Shared,
    connections: JoinSet<()>,
    next_connection_id: u64,
}

impl Server {
    /// Bind to the address and port of `config.server`.
    pub async fn bind(
        config: Rc<Config>,
        storage: Rc<dyn MonitoringStorage>,
        mail: Rc<dyn MailManager>,
    ) -> std::io::Result<Server> {
        let address = SocketAddr::new(config.server.address, config.server.port);
        let listener = TcpListener::bind(address).await?;
        info!("listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            shared: Shared {
                config,
                storage,
                mail,
            },
            connections: JoinSet::new(),
            next_connection_id: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then drop every open connection.
    ///
    /// Must be called from within a [`tokio::task::LocalSet`].
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(UPDATE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.shared.storage.update(),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn(stream, peer),
                    Err(e) => warn!("failed to accept connection: {e}"),
                },
                Some(finished) = self.connections.join_next() => {
                    if let Err(e) = finished
                        && e.is_panic()
                    {
                        error!("connection task panicked: {e}");
                    }
                }
            }
        }

        info!("shutting down, closing {} connections", self.connections.len());
        self.connections.shutdown().await;
    }

    fn spawn(&mut self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        debug!("accepted connection {id} from {peer}");

        let connection = Connection::new(id, stream, self.shared.clone());
        self.connections.spawn_local(connection.run());
    }
}
