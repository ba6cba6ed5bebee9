//! One accepted socket, from request to response.
//!
//! Each connection serves exactly one request. It walks through the states of
//! [`ConnectionState`] strictly in order and may skip ahead to
//! [`ConnectionState::Sending`] on any failure. Dropping a connection while it
//! waits on storage abandons the outstanding storage request.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, instrument, warn};

use super::{
    Shared,
    protocol::{
        CPU_USAGE_PARAMETER, MAX_REQUEST_SIZE, MEMORY_USAGE_PARAMETER, PROCESS_COUNT_PARAMETER,
        TIMESTAMP_PARAMETER, USER_KEY_PARAMETER,
    },
};
use crate::{
    config::ClientConfig,
    http::{ProtocolError, ProtocolResult, Request, Response, Status},
    limit_monitor::{LimitMonitor, LimitReport, render_notification},
    mail::Mail,
    storage::{MonitoringRecord, StorageError, StorageRequest},
    util,
};

enum ConnectionState {
    Receiving,
    StoringRecord {
        client: ClientConfig,
        record: MonitoringRecord,
        request: StorageRequest<()>,
    },
    CheckingNotification {
        client: ClientConfig,
        report: LimitReport,
        request: StorageRequest<bool>,
    },
    StoringNotification(StorageRequest<()>),
    Sending(Response),
    Closed,
}

/// Why a well-formed request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingParameter(&'static str),
    UnknownClient(String),
    InvalidTimestamp(String),
    InvalidMetric { name: &'static str, value: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingParameter(name) => {
                write!(f, "mandatory parameter '{name}' missing")
            }
            ValidationError::UnknownClient(key) => write!(f, "unknown user key '{key}'"),
            ValidationError::InvalidTimestamp(value) => {
                write!(f, "invalid '{TIMESTAMP_PARAMETER}' value '{value}'")
            }
            ValidationError::InvalidMetric { name, value } => {
                write!(f, "invalid '{name}' value '{value}'")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub(crate) struct Connection<S> {
    id: u64,
    stream: S,
    shared: Shared,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(id: u64, stream: S, shared: Shared) -> Connection<S> {
        Self { id, stream, shared }
    }

    #[instrument(skip_all, fields(connection = self.id))]
    pub(crate) async fn run(mut self) {
        let mut state = ConnectionState::Receiving;

        loop {
            state = match state {
                ConnectionState::Receiving => match self.receive().await {
                    Ok(Some(Ok(request))) => self.process_request(&request),
                    Ok(Some(Err(e))) => {
                        warn!("malformed request: {e}");
                        ConnectionState::Sending(Response::new(Status::BadRequest))
                    }
                    Ok(None) => {
                        debug!("peer closed before sending a complete request");
                        ConnectionState::Closed
                    }
                    Err(e) => {
                        debug!("receive failed: {e}");
                        ConnectionState::Closed
                    }
                },
                ConnectionState::StoringRecord {
                    client,
                    record,
                    request,
                } => match request.await {
                    Ok(()) => self.process_limits(client, &record),
                    Err(e) => storage_failure(e),
                },
                ConnectionState::CheckingNotification {
                    client,
                    report,
                    request,
                } => match request.await {
                    Ok(true) => self.notify(&client, &report),
                    Ok(false) => {
                        debug!("notification for '{}' suppressed", client.key);
                        ConnectionState::Sending(Response::new(Status::Ok))
                    }
                    Err(e) => storage_failure(e),
                },
                ConnectionState::StoringNotification(request) => match request.await {
                    Ok(()) => ConnectionState::Sending(Response::new(Status::Ok)),
                    Err(e) => storage_failure(e),
                },
                ConnectionState::Sending(response) => {
                    if let Err(e) = self.send(&response).await {
                        debug!("send failed: {e}");
                    }
                    ConnectionState::Closed
                }
                ConnectionState::Closed => break,
            };
        }
    }

    /// Read until a full request parsed. `None` if the peer hung up first.
    async fn receive(&mut self) -> std::io::Result<Option<ProtocolResult<Request>>> {
        let mut buf = Vec::with_capacity(1024);

        loop {
            if self.stream.read_buf(&mut buf).await? == 0 {
                return Ok(None);
            }

            match Request::parse(&buf) {
                Ok((request, _)) => return Ok(Some(Ok(request))),
                Err(ProtocolError::Incomplete) if buf.len() <= MAX_REQUEST_SIZE => {}
                Err(ProtocolError::Incomplete) => {
                    return Ok(Some(Err(ProtocolError::TooLarge(buf.len()))));
                }
                Err(e) => return Ok(Some(Err(e))),
            }
        }
    }

    fn process_request(&self, request: &Request) -> ConnectionState {
        match validate(request, |key| self.shared.config.client(key)) {
            Ok((client, record)) => {
                let request = self.shared.storage.store_record(&record);
                ConnectionState::StoringRecord {
                    client: client.clone(),
                    record,
                    request,
                }
            }
            Err(e) => {
                warn!("bad request: {e}");
                ConnectionState::Sending(Response::new(Status::BadRequest))
            }
        }
    }

    fn process_limits(&self, client: ClientConfig, record: &MonitoringRecord) -> ConnectionState {
        let report = LimitMonitor::new(client.limits).evaluate(record);
        if report.is_empty() {
            return ConnectionState::Sending(Response::new(Status::Ok));
        }

        let request = self
            .shared
            .storage
            .check_notification_interval(&client.key, client.notification_period);
        ConnectionState::CheckingNotification {
            client,
            report,
            request,
        }
    }

    fn notify(&self, client: &ClientConfig, report: &LimitReport) -> ConnectionState {
        let templates = &self.shared.config.mail;
        let limits = report.render(&templates.limit_line);

        info!("notifying {} about '{}'", client.mail, client.key);
        self.shared.mail.send_mail(Mail {
            sender: templates.sender.clone(),
            recipient: client.mail.clone(),
            subject: templates.subject.clone(),
            body: render_notification(&templates.body, &client.key, &limits),
        });

        ConnectionState::StoringNotification(self.shared.storage.store_notification_time(&client.key))
    }

    async fn send(&mut self, response: &Response) -> std::io::Result<()> {
        debug!("responding {}", response.status());
        self.stream.write_all(&response.to_bytes()).await?;
        self.stream.shutdown().await
    }
}

fn storage_failure(e: StorageError) -> ConnectionState {
    error!("storage request failed: {e}");
    ConnectionState::Sending(Response::new(Status::InternalServerError))
}

/// Check the parameters of `request` in order and turn them into a record.
pub fn validate<'c>(
    request: &Request,
    lookup: impl FnOnce(&str) -> Option<&'c ClientConfig>,
) -> Result<(&'c ClientConfig, MonitoringRecord), ValidationError> {
    if !request.has_parameter(USER_KEY_PARAMETER) {
        return Err(ValidationError::MissingParameter(USER_KEY_PARAMETER));
    }
    let user_key = request.parameter(USER_KEY_PARAMETER);
    let client = lookup(user_key).ok_or_else(|| ValidationError::UnknownClient(user_key.to_string()))?;

    if !request.has_parameter(TIMESTAMP_PARAMETER) {
        return Err(ValidationError::MissingParameter(TIMESTAMP_PARAMETER));
    }
    let timestamp = request.parameter(TIMESTAMP_PARAMETER);
    let timestamp = util::parse_timestamp(timestamp)
        .ok_or_else(|| ValidationError::InvalidTimestamp(timestamp.to_string()))?;

    let record = MonitoringRecord {
        user_key: user_key.to_string(),
        timestamp,
        cpu_usage: percentage(request, CPU_USAGE_PARAMETER)?,
        memory_usage: percentage(request, MEMORY_USAGE_PARAMETER)?,
        process_count: canonical_number(request, PROCESS_COUNT_PARAMETER)?,
    };

    Ok((client, record))
}

fn percentage(request: &Request, name: &'static str) -> Result<Option<u8>, ValidationError> {
    let Some(value) = canonical_number::<u8>(request, name)? else {
        return Ok(None);
    };

    if value > 100 {
        return Err(ValidationError::InvalidMetric {
            name,
            value: value.to_string(),
        });
    }
    Ok(Some(value))
}

/// An empty or missing parameter is `None`. Anything else must print back
/// exactly as it was sent, which rules out signs, padding and leading zeros.
fn canonical_number<T>(request: &Request, name: &'static str) -> Result<Option<T>, ValidationError>
where
    T: std::str::FromStr + ToString,
{
    let value = request.parameter(name);
    if value.is_empty() {
        return Ok(None);
    }

    match value.parse::<T>() {
        Ok(number) if number.to_string() == value => Ok(Some(number)),
        _ => Err(ValidationError::InvalidMetric {
            name,
            value: value.to_string(),
        }),
    }
}
