//! Helper functions for integration tests

use std::{
    cell::{Cell, RefCell},
    future::poll_fn,
    net::{Ipv4Addr, SocketAddr},
    rc::Rc,
    task::Poll,
    time::Duration,
};

use futures::FutureExt;
use metrics_collector::{
    config::{ClientConfig, Config, Limits, MailConfig, ServerSettings, StorageConfig},
    database::{ConnectFuture, Driver, QueryCompletion, QueryFuture, QueryResults},
    http::{Method, Request, Response},
    mail::{Mail, MailManager},
    server::{Server, protocol},
    storage::{MonitoringRecord, MonitoringStorage, StorageRequest, StorageResult},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::oneshot,
    task::{JoinHandle, spawn_local},
};

pub const TIMESTAMP: &str = "20251016T120000";

#[derive(Default)]
pub struct RecordingMailer {
    sent: RefCell<Vec<Mail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.borrow().clone()
    }
}

impl MailManager for RecordingMailer {
    fn send_mail(&self, mail: Mail) {
        self.sent.borrow_mut().push(mail);
    }
}

/// Passes everything through to `inner` and counts the calls.
pub struct CountingStorage<S> {
    pub inner: S,
    pub stored_records: Cell<usize>,
    pub interval_checks: Cell<usize>,
    pub notification_times: Cell<usize>,
}

impl<S> CountingStorage<S> {
    pub fn new(inner: S) -> CountingStorage<S> {
        Self {
            inner,
            stored_records: Cell::new(0),
            interval_checks: Cell::new(0),
            notification_times: Cell::new(0),
        }
    }
}

impl<S: MonitoringStorage> MonitoringStorage for CountingStorage<S> {
    fn store_record(&self, record: &MonitoringRecord) -> StorageRequest<()> {
        self.stored_records.set(self.stored_records.get() + 1);
        self.inner.store_record(record)
    }

    fn check_notification_interval(&self, user_key: &str, period: Duration) -> StorageRequest<bool> {
        self.interval_checks.set(self.interval_checks.get() + 1);
        self.inner.check_notification_interval(user_key, period)
    }

    fn store_notification_time(&self, user_key: &str) -> StorageRequest<()> {
        self.notification_times.set(self.notification_times.get() + 1);
        self.inner.store_notification_time(user_key)
    }

    fn update(&self) {
        self.inner.update();
    }
}

/// Connects at once; scripts stay in flight until [`GatedDriver::release`].
#[derive(Default, Clone)]
pub struct GatedDriver {
    released: Rc<Cell<bool>>,
    executed: Rc<Cell<usize>>,
}

impl GatedDriver {
    pub fn release(&self) {
        self.released.set(true);
    }

    /// Scripts handed to the driver so far
    pub fn executed(&self) -> usize {
        self.executed.get()
    }
}

impl Driver for GatedDriver {
    type Connection = ();

    fn connect(&self) -> ConnectFuture<()> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn execute(&self, connection: (), _sql: String) -> QueryFuture<()> {
        self.executed.set(self.executed.get() + 1);
        let released = self.released.clone();

        Box::pin(poll_fn(move |_| {
            if released.get() {
                Poll::Ready(QueryCompletion {
                    connection: Some(connection),
                    outcome: Ok(QueryResults::default()),
                })
            } else {
                Poll::Pending
            }
        }))
    }
}

pub fn create_client(key: &str, cpu: u8, memory: u8, processes: u32) -> ClientConfig {
    ClientConfig {
        key: key.to_string(),
        mail: format!("{key}@example.com"),
        notification_period: Duration::from_secs(300),
        limits: Limits {
            cpu,
            memory,
            processes,
        },
    }
}

pub fn create_config(clients: impl IntoIterator<Item = ClientConfig>) -> Config {
    Config::new(
        ServerSettings {
            address: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            default_notification_period: 300,
        },
        StorageConfig::None,
        MailConfig::default(),
        clients,
    )
    .unwrap()
}

pub fn metrics_request(user_key: &str, cpu: &str, memory: &str, processes: &str) -> Request {
    let mut request = Request::new(Method::Post, protocol::METRICS_PATH);
    request
        .add_parameter(protocol::USER_KEY_PARAMETER, user_key)
        .add_parameter(protocol::TIMESTAMP_PARAMETER, TIMESTAMP)
        .add_parameter(protocol::CPU_USAGE_PARAMETER, cpu)
        .add_parameter(protocol::MEMORY_USAGE_PARAMETER, memory)
        .add_parameter(protocol::PROCESS_COUNT_PARAMETER, processes);
    request
}

/// A collector running on the current `LocalSet`.
pub struct TestCollector {
    pub address: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TestCollector {
    pub async fn start(
        config: Config,
        storage: Rc<dyn MonitoringStorage>,
        mail: Rc<dyn MailManager>,
    ) -> TestCollector {
        let server = Server::bind(Rc::new(config), storage, mail).await.unwrap();
        let address = server.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel();
        let task = spawn_local(server.run(async {
            stopped.await.ok();
        }));

        Self {
            address,
            stop,
            task,
        }
    }

    pub async fn send(&self, raw: &[u8]) -> Response {
        let raw = self.send_raw(raw).await;
        Response::from_bytes(&raw).unwrap()
    }

    /// Everything the collector wrote before closing the connection.
    pub async fn send_raw(&self, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.address).await.unwrap();
        stream.write_all(raw).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    pub async fn stop(self) {
        self.stop.send(()).ok();
        self.task.await.unwrap();
    }
}

/// Poll a storage request, driving `storage` like the server's ticker does.
pub async fn wait_for<T: 'static>(
    storage: &dyn MonitoringStorage,
    mut request: StorageRequest<T>,
) -> StorageResult<T> {
    loop {
        storage.update();
        if let Some(result) = (&mut request).now_or_never() {
            return result;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
