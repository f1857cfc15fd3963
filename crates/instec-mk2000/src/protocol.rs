//! MK2000 line framing.
//!
//! Commands are single ASCII lines of the SCPI-like `TEMP:`/`PROF:`
//! vocabulary, sent with a trailing `\n`. Several commands may share a line
//! separated by `;`, with later headers relative to the first one's
//! subsystem (`TEMP:HOLD 50; ERR?`).
//!
//! Replies end with `\r\n`. A reply may arrive split across any number of
//! transport reads, so a reply is only complete once the accumulated bytes
//! end with the terminator.

use bytes::{BufMut, BytesMut};
use instec_core::{Error, Result};

/// Appended to every command line.
pub const COMMAND_TERMINATOR: u8 = b'\n';

/// Ends every reply.
pub const REPLY_TERMINATOR: &[u8] = b"\r\n";

/// Upper bound on an accumulated reply. The longest legitimate reply (a
/// vector of one value per slave) is far shorter; anything past this is a
/// desynchronised stream.
pub const MAX_REPLY_LEN: usize = 4096;

/// Encode a command line for transmission.
///
/// ```
/// use instec_mk2000::protocol::encode_command;
///
/// assert_eq!(encode_command("TEMP:RTIN?"), b"TEMP:RTIN?\n");
/// ```
pub fn encode_command(line: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(COMMAND_TERMINATOR);
    buf.to_vec()
}

/// Whether `buf` holds a complete reply.
pub fn is_complete(buf: &[u8]) -> bool {
    buf.ends_with(REPLY_TERMINATOR)
}

/// Strip the terminator from a complete reply and decode it as text.
pub fn decode_reply(buf: &[u8]) -> Result<String> {
    let body = buf.strip_suffix(REPLY_TERMINATOR).unwrap_or(buf);
    std::str::from_utf8(body)
        .map(str::to_string)
        .map_err(|e| Error::Decode(format!("reply is not valid text: {e}")))
}
