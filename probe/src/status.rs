//! Kernel status file fallback.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use tracing::debug;

use crate::ProbeError;

/// Read the first byte of `path`; ASCII `'1'` means FIPS mode is on.
pub(crate) fn read_status(path: &Path) -> Result<bool, ProbeError> {
    debug!(path = %path.display(), "reading FIPS status file");

    let mut file = File::open(path).map_err(|source| ProbeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut byte = [0u8; 1];
    match file.read_exact(&mut byte) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(ProbeError::Empty {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ProbeError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    debug!(
        character = %char::from(byte[0]).escape_default(),
        "read FIPS status character"
    );
    Ok(byte[0] == b'1')
}
