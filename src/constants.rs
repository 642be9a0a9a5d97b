// -
// Wire protocol tokens

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Command keywords
pub(crate) const CMD_SET: &str = "set";
pub(crate) const CMD_GET: &str = "get";
pub(crate) const CMD_DELETE: &str = "delete";
pub(crate) const CMD_VERSION: &str = "version";

/// Terminal response lines
pub(crate) const RESP_STORED: &str = "STORED";
pub(crate) const RESP_DELETED: &str = "DELETED";
pub(crate) const RESP_NOT_FOUND: &str = "NOT_FOUND";
pub(crate) const RESP_END: &str = "END";
pub(crate) const DELETE_TERMINALS: &str = "DELETED or NOT_FOUND";
pub(crate) const GET_TERMINALS: &str = "END or VALUE/value/END";

/// Header token of a retrieval hit
pub(crate) const RESP_VALUE: &str = "VALUE";
/// Header token of a version reply
pub(crate) const RESP_VERSION: &str = "VERSION";

// -
// Key rules enforced by the server

pub(crate) const KEY_MAX_LENGTH: usize = 250;

// -
// Metadata tolerance

/// Declared-length drift observed on the wire so far
pub(crate) const DEFAULT_MAX_LENGTH_SKEW: usize = 2;
