use bytes::BufMut;
use bytes::BytesMut;

use crate::constants::CMD_DELETE;
use crate::constants::CMD_GET;
use crate::constants::CMD_SET;
use crate::constants::CMD_VERSION;
use crate::constants::CRLF;
use crate::Record;

/// Request sent on a single connection.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Command<'a> {
    Set(&'a Record),
    Get(&'a str),
    Delete(&'a str),
    Version,
}

impl Command<'_> {
    /// Appends the complete request, payload included, to `buf`.
    pub(crate) fn encode(
        &self,
        buf: &mut BytesMut,
    ) {
        match self {
            Command::Set(record) => {
                let header = format!(
                    "{CMD_SET} {} {} {} {}",
                    record.key,
                    record.flag,
                    record.exptime.to_wire(),
                    record.value.len()
                );
                buf.reserve(header.len() + record.value.len() + 2 * CRLF.len());
                buf.put_slice(header.as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(&record.value);
                buf.put_slice(CRLF);
            }
            Command::Get(key) => put_line(buf, &format!("{CMD_GET} {key}")),
            Command::Delete(key) => put_line(buf, &format!("{CMD_DELETE} {key}")),
            Command::Version => put_line(buf, CMD_VERSION),
        }
    }

    pub(crate) fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

fn put_line(
    buf: &mut BytesMut,
    line: &str,
) {
    buf.reserve(line.len() + CRLF.len());
    buf.put_slice(line.as_bytes());
    buf.put_slice(CRLF);
}
