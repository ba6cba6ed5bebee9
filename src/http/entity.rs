//! Header fields and body framing shared by requests and responses.

use super::{ProtocolError, ProtocolResult};

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const CHUNKED: &str = "chunked";

const CRLF: &[u8] = b"\r\n";
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A single protocol header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// Ordered header fields plus the body they frame.
///
/// At most one of `Content-Length` and `Transfer-Encoding: chunked` is ever
/// present; once a body has been set exactly one of them is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    fields: Vec<Field>,
    body: Vec<u8>,
}

impl Entity {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_value(name).is_some()
    }

    /// Value of the first field whose name matches `name` ignoring ASCII case.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| field.value.as_str())
    }

    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> ProtocolResult<()> {
        let name = name.into();
        let value = value.into();

        if self.has_field(&name) {
            return Err(ProtocolError::DuplicateField(name));
        }

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            // the real length is filled in by set_body
            if value != "0" {
                return Err(ProtocolError::InvalidContentLength(value));
            }
            if self.is_chunked() {
                return Err(ProtocolError::ConflictingFraming);
            }
        } else if name.eq_ignore_ascii_case(TRANSFER_ENCODING) {
            if value != CHUNKED {
                return Err(ProtocolError::UnsupportedTransferEncoding(value));
            }
            if self.has_field(CONTENT_LENGTH) {
                return Err(ProtocolError::ConflictingFraming);
            }
        }

        self.fields.push(Field { name, value });
        Ok(())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Attach a body, keeping whichever framing field is already present and
    /// falling back to chunked encoding.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();

        if let Some(field) = self
            .fields
            .iter_mut()
            .find(|field| field.name.eq_ignore_ascii_case(CONTENT_LENGTH))
        {
            field.value = self.body.len().to_string();
            return;
        }

        if !self.has_field(TRANSFER_ENCODING) {
            self.fields.push(Field {
                name: TRANSFER_ENCODING.to_string(),
                value: CHUNKED.to_string(),
            });
        }
    }

    fn is_chunked(&self) -> bool {
        self.field_value(TRANSFER_ENCODING) == Some(CHUNKED)
    }

    /// Append the header section and the framed body to `out`.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            out.extend_from_slice(field.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(field.value.as_bytes());
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(CRLF);

        if self.has_field(CONTENT_LENGTH) {
            out.extend_from_slice(&self.body);
        } else if self.is_chunked() {
            if !self.body.is_empty() {
                out.extend_from_slice(format!("{:x}", self.body.len()).as_bytes());
                out.extend_from_slice(CRLF);
                out.extend_from_slice(&self.body);
                out.extend_from_slice(CRLF);
            }
            out.extend_from_slice(b"0\r\n\r\n");
        }
    }

    /// Parse a complete message head and body from the front of `buf`.
    ///
    /// Returns the start line, the entity and the number of bytes consumed.
    pub(crate) fn parse(buf: &[u8]) -> ProtocolResult<(&str, Entity, usize)> {
        let head_end = find(buf, 0, HEAD_TERMINATOR).ok_or(ProtocolError::Incomplete)?;
        let head = std::str::from_utf8(&buf[..head_end])
            .map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))?;

        let mut lines = head.split("\r\n");
        let start_line = lines.next().unwrap_or_default();

        let mut entity = Entity::default();
        for line in lines {
            entity.push_wire_field(line)?;
        }

        let body_start = head_end + HEAD_TERMINATOR.len();
        let consumed = entity.read_body(buf, body_start)?;

        Ok((start_line, entity, consumed))
    }

    fn push_wire_field(&mut self, line: &str) -> ProtocolResult<()> {
        let colon = line
            .find(':')
            .filter(|&colon| colon > 0 && line[colon + 1..].starts_with(' '))
            .ok_or_else(|| ProtocolError::InvalidHeader(line.to_string()))?;

        let name = &line[..colon];
        let value = &line[colon + 2..];

        if self.has_field(name) {
            return Err(ProtocolError::DuplicateField(name.to_string()));
        }

        self.fields.push(Field {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn read_body(&mut self, buf: &[u8], start: usize) -> ProtocolResult<usize> {
        let content_length = self.field_value(CONTENT_LENGTH);
        let transfer_encoding = self.field_value(TRANSFER_ENCODING);

        match (content_length, transfer_encoding) {
            (Some(_), Some(_)) => Err(ProtocolError::ConflictingFraming),
            (Some(length), None) => {
                let length: usize = length
                    .parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(length.to_string()))?;
                let end = start
                    .checked_add(length)
                    .ok_or_else(|| ProtocolError::InvalidContentLength(length.to_string()))?;
                if buf.len() < end {
                    return Err(ProtocolError::Incomplete);
                }
                self.body = buf[start..end].to_vec();
                Ok(end)
            }
            (None, Some(CHUNKED)) => {
                let (body, end) = read_chunks(buf, start)?;
                self.body = body;
                Ok(end)
            }
            (None, Some(other)) => Err(ProtocolError::UnsupportedTransferEncoding(
                other.to_string(),
            )),
            (None, None) => Ok(start),
        }
    }
}

fn read_chunks(buf: &[u8], mut pos: usize) -> ProtocolResult<(Vec<u8>, usize)> {
    let mut body = Vec::new();

    loop {
        let line_end = find(buf, pos, CRLF).ok_or(ProtocolError::Incomplete)?;
        let size = parse_chunk_size(&buf[pos..line_end])?;
        pos = line_end + CRLF.len();

        let too_large = || ProtocolError::InvalidChunk(format!("chunk size {size:x} too large"));
        let data_end = pos.checked_add(size).ok_or_else(too_large)?;
        let chunk_end = data_end.checked_add(CRLF.len()).ok_or_else(too_large)?;
        if buf.len() < chunk_end {
            return Err(ProtocolError::Incomplete);
        }
        if &buf[data_end..chunk_end] != CRLF {
            return Err(ProtocolError::InvalidChunk(
                "chunk not terminated by CRLF".to_string(),
            ));
        }

        body.extend_from_slice(&buf[pos..data_end]);
        pos = chunk_end;

        if size == 0 {
            return Ok((body, pos));
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> ProtocolResult<usize> {
    let line = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidChunk("chunk size is not ASCII".to_string()))?;
    // chunk extensions are ignored
    let size = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(size, 16)
        .map_err(|_| ProtocolError::InvalidChunk(format!("bad chunk size \"{line}\"")))
}

pub(crate) fn find(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    buf.get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| from + position)
}
