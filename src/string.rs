use std::io::{self, Read};

use byteorder::ReadBytesExt;

use crate::consts;
use crate::error::corrupt_directory;

/// Reads a NUL-terminated cabinet string (filenames, prev/next cabinet
/// names and labels).
///
/// The `is_utf8` flag (attribute bit 0x80 for filenames) only changes how a
/// cabinet *author* is supposed to have encoded the bytes; whether UTF-8 or
/// the system's OEM code page, we decode permissively rather than rejecting
/// a file whose name isn't perfectly round-trippable.
pub(crate) fn read_null_terminated_string<R: Read>(
    reader: &mut R,
    _is_utf8: bool,
) -> io::Result<String> {
    let mut bytes = Vec::<u8>::with_capacity(consts::MAX_STRING_SIZE);
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        } else if bytes.len() == consts::MAX_STRING_SIZE {
            corrupt_directory!(
                "String longer than maximum of {} bytes",
                consts::MAX_STRING_SIZE
            );
        }
        bytes.push(byte);
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}
