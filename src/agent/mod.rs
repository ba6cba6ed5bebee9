//! Periodically pushes local metrics to the collector.

mod metrics;

use anyhow::{Context, bail};
use chrono::NaiveDateTime;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::sleep,
};
use tracing::{debug, error, info, instrument, warn};

pub use metrics::{FixedSystemMetrics, PlatformSystemMetrics, Sample, SystemMetrics};

use crate::{
    config::AgentConfig,
    http::{CONTENT_LENGTH, Message, Method, ProtocolError, Request, Response, Status},
    server::protocol::{
        CPU_USAGE_PARAMETER, MAX_REQUEST_SIZE, MEMORY_USAGE_PARAMETER, METRICS_PATH,
        PROCESS_COUNT_PARAMETER, TIMESTAMP_PARAMETER, USER_KEY_PARAMETER,
    },
    util,
};

pub struct Agent<M> {
    config: AgentConfig,
    metrics: M,
}

impl<M: SystemMetrics> Agent<M> {
    pub fn new(config: AgentConfig, metrics: M) -> Agent<M> {
        Self { config, metrics }
    }

    /// Push a sample every update interval. Never returns; failed pushes are
    /// logged and retried with the next sample.
    pub async fn run(&mut self) {
        info!(
            "pushing metrics of '{}' to {}:{} every {}s",
            self.config.key,
            self.config.host,
            self.config.port,
            self.config.update_interval.as_secs()
        );

        loop {
            sleep(self.config.update_interval).await;

            match self.push_once().await {
                Ok(Status::Ok) => debug!("metrics accepted"),
                Ok(status) => warn!("collector answered {status}"),
                Err(e) => error!("failed to push metrics: {e:#}"),
            }
        }
    }

    /// Take one sample, send it and wait for the collector's answer.
    #[instrument(skip_all)]
    pub async fn push_once(&mut self) -> anyhow::Result<Status> {
        let sample = self.metrics.sample();
        let request = build_request(&self.config.key, util::now(), &sample)?;

        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| format!("connecting to {}:{}", self.config.host, self.config.port))?;

        stream.write_all(&request.to_bytes()).await?;
        let response = read_response(&mut stream).await?;
        stream.shutdown().await?;

        Ok(response.status())
    }
}

pub fn build_request(
    user_key: &str,
    timestamp: NaiveDateTime,
    sample: &Sample,
) -> anyhow::Result<Request> {
    fn optional(value: Option<impl ToString>) -> String {
        value.map(|value| value.to_string()).unwrap_or_default()
    }

    let mut request = Request::new(Method::Post, METRICS_PATH);
    request
        .add_parameter(USER_KEY_PARAMETER, user_key)
        .add_parameter(TIMESTAMP_PARAMETER, util::format_timestamp(timestamp))
        .add_parameter(CPU_USAGE_PARAMETER, optional(sample.cpu_usage))
        .add_parameter(MEMORY_USAGE_PARAMETER, optional(sample.memory_usage))
        .add_parameter(PROCESS_COUNT_PARAMETER, optional(sample.process_count));
    request.add_field(CONTENT_LENGTH, "0")?;

    Ok(request)
}

async fn read_response(stream: &mut TcpStream) -> anyhow::Result<Response> {
    let mut buf = Vec::with_capacity(256);

    loop {
        let read = stream.read_buf(&mut buf).await?;

        match Response::parse(&buf) {
            Ok((response, _)) => return Ok(response),
            Err(ProtocolError::Incomplete) if read == 0 => {
                bail!("collector closed the connection before responding")
            }
            Err(ProtocolError::Incomplete) if buf.len() > MAX_REQUEST_SIZE => {
                bail!(ProtocolError::TooLarge(buf.len()))
            }
            Err(ProtocolError::Incomplete) => {}
            Err(e) => return Err(e.into()),
        }
    }
}
