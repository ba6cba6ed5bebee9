use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use super::{HTTP_VERSION, Message, ProtocolError, ProtocolResult, entity::Entity, url};

static PARAMETER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w+%]+)=([^&]*)").expect("parameter pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `name=value` pair carried in the query part of the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: String,
    parameters: Vec<Parameter>,
    entity: Entity,
}

impl Default for Request {
    fn default() -> Self {
        Request::new(Method::Get, "/")
    }
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Request {
        Self {
            method,
            path: path.into(),
            parameters: vec![],
            entity: Entity::default(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|parameter| parameter.name == name)
    }

    /// Value of the first parameter called `name`, or an empty string.
    pub fn parameter(&self, name: &str) -> &str {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .map_or("", |parameter| parameter.value.as_str())
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Parse a request from the front of `buf`, returning it together with
    /// the number of bytes it occupied.
    pub fn parse(buf: &[u8]) -> ProtocolResult<(Request, usize)> {
        let (start_line, entity, consumed) = Entity::parse(buf)?;

        let mut parts = start_line.splitn(3, ' ');
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::InvalidStartLine(start_line.to_string()));
        };

        let method = method.parse()?;
        if version != HTTP_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version.to_string()));
        }

        let (path, parameters) = match target.split_once('?') {
            Some((path, query)) => (path, parse_parameters(query)?),
            None => (target, vec![]),
        };

        let request = Request {
            method,
            path: path.to_string(),
            parameters,
            entity,
        };
        Ok((request, consumed))
    }

    /// Parse a buffer that holds exactly one request.
    pub fn from_bytes(buf: &[u8]) -> ProtocolResult<Request> {
        let (request, consumed) = Request::parse(buf)?;
        if consumed != buf.len() {
            return Err(ProtocolError::TrailingData(buf.len() - consumed));
        }
        Ok(request)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut target = self.path.clone();
        for (i, parameter) in self.parameters.iter().enumerate() {
            target.push(if i == 0 { '?' } else { '&' });
            target.push_str(&url::encode(&parameter.name));
            target.push('=');
            target.push_str(&url::encode(&parameter.value));
        }

        let mut out = format!("{} {target} {HTTP_VERSION}\r\n", self.method).into_bytes();
        self.entity.write_to(&mut out);
        out
    }
}

impl Message for Request {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

fn parse_parameters(query: &str) -> ProtocolResult<Vec<Parameter>> {
    PARAMETER_PATTERN
        .captures_iter(query)
        .map(|captures| {
            Ok(Parameter {
                name: url::decode(&captures[1])?,
                value: url::decode(&captures[2])?,
            })
        })
        .collect()
}
