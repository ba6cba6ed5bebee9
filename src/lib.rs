//! Resource metrics collection with limit notifications.
//!
//! Agents ([`agent`]) periodically push CPU, memory and process samples to a
//! collector ([`server`]) over a small HTTP/1.1 dialect ([`http`]). The
//! collector stores every sample ([`storage`]) and mails the owner of a client
//! ([`mail`]) when a sample exceeds the client's configured limits, at most
//! once per notification period.

pub mod agent;
pub mod config;
pub mod database;
pub mod http;
pub mod limit_monitor;
pub mod mail;
pub mod server;
pub mod storage;
pub mod util;
