//! Minimal HTTP/1.1 codec spoken between agents and the collector
//!
//! Only what the metrics protocol needs is supported:
//!
//! - `GET` and `POST` requests whose query string carries the payload as
//!   percent-encoded path parameters
//! - header fields with case-insensitive, unique names
//! - bodies framed by `Content-Length` or a single `chunked` data chunk
//!
//! Parsing works on byte buffers and reports [`ProtocolError::Incomplete`]
//! until a whole message is available, so callers can keep reading from the
//! socket and retry.
//!
//! ```
//! use metrics_collector::http::{Message, Method, Request};
//!
//! let mut request = Request::new(Method::Post, "/metrics");
//! request.add_parameter("userKey", "web_01");
//! request.add_field("Content-Length", "0").unwrap();
//!
//! let parsed = Request::from_bytes(&request.to_bytes()).unwrap();
//! assert_eq!(parsed, request);
//! ```

mod entity;
mod error;
mod request;
mod response;
mod url;

pub use entity::{CHUNKED, CONTENT_LENGTH, Entity, Field, TRANSFER_ENCODING};
pub use error::{ProtocolError, ProtocolResult};
pub use request::{Method, Parameter, Request};
pub use response::{Response, Status};

pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Header and body access shared by [`Request`] and [`Response`].
pub trait Message {
    fn entity(&self) -> &Entity;

    fn entity_mut(&mut self) -> &mut Entity;

    fn fields(&self) -> &[Field] {
        self.entity().fields()
    }

    fn has_field(&self, name: &str) -> bool {
        self.entity().has_field(name)
    }

    fn field_value(&self, name: &str) -> Option<&str> {
        self.entity().field_value(name)
    }

    fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> ProtocolResult<()>
    where
        Self: Sized,
    {
        self.entity_mut().add_field(name, value)
    }

    fn body(&self) -> &[u8] {
        self.entity().body()
    }

    fn set_body(&mut self, body: impl Into<Vec<u8>>)
    where
        Self: Sized,
    {
        self.entity_mut().set_body(body)
    }
}
