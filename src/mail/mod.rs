//! Outgoing notification mail
//!
//! Sending is fire-and-forget: [`MailManager::send_mail`] only appends to a
//! queue. A dedicated worker thread takes mails off the queue one at a time
//! and hands them to a [`MailTransport`]. Failures are logged and dropped.

mod transport;

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use tracing::{debug, error, info};

pub use transport::{LogMailTransport, SmtpMailTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Accepts mails for asynchronous, best-effort delivery.
pub trait MailManager {
    fn send_mail(&self, mail: Mail);
}

/// Delivers a single mail, blocking until done.
pub trait MailTransport: Send + 'static {
    fn deliver(&mut self, mail: &Mail) -> anyhow::Result<()>;
}

#[derive(Default)]
struct Queue {
    mails: VecDeque<Mail>,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`MailManager`] backed by a FIFO and a worker thread.
///
/// Dropping the manager stops the worker; mails still queued at that point
/// are discarded. Drop blocks until the delivery in progress, if any, has
/// finished, since SMTP delivery is blocking I/O on the worker thread.
pub struct QueuedMailManager {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedMailManager {
    pub fn start(transport: impl MailTransport) -> std::io::Result<QueuedMailManager> {
        let shared = Arc::new(Shared::default());

        let worker = thread::Builder::new().name("mail-worker".to_string()).spawn({
            let shared = shared.clone();
            move || work(&shared, transport)
        })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }
}

impl MailManager for QueuedMailManager {
    fn send_mail(&self, mail: Mail) {
        debug!("queueing mail to {}", mail.recipient);
        self.shared.lock().mails.push_back(mail);
        self.shared.available.notify_one();
    }
}

impl Drop for QueuedMailManager {
    fn drop(&mut self) {
        self.shared.lock().stopped = true;
        self.shared.available.notify_all();

        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("mail worker panicked");
        }
    }
}

fn work(shared: &Shared, mut transport: impl MailTransport) {
    debug!("mail worker started");

    while let Some(mail) = next_mail(shared) {
        match transport.deliver(&mail) {
            Ok(()) => info!("sent notification mail to {}", mail.recipient),
            Err(e) => error!("failed to send mail to {}: {e:#}", mail.recipient),
        }
    }

    debug!("mail worker stopped");
}

/// Block until a mail is queued. `None` once the manager is stopped.
fn next_mail(shared: &Shared) -> Option<Mail> {
    let mut queue = shared.lock();
    loop {
        if queue.stopped {
            return None;
        }
        if let Some(mail) = queue.mails.pop_front() {
            return Some(mail);
        }
        queue = shared
            .available
            .wait(queue)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
