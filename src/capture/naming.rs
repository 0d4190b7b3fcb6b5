use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

use crate::error::{CaptureError, Result};

/// Candidate names tried per timestamp: the bare name plus `.1` to `.999`.
pub const MAX_CANDIDATES: u32 = 1000;

/// Create a new `capture-<ts>[.<n>]` file under `root` and return it opened
/// for writing.
///
/// Each candidate is created with `create_new`, so two writers racing on the
/// same second never end up sharing a file.
pub async fn claim_capture_file(root: &Path, unix_ts: i64) -> Result<(PathBuf, File)> {
    let stem = format!("capture-{}", unix_ts);

    for counter in 0..MAX_CANDIDATES {
        let candidate = if counter == 0 {
            root.join(&stem)
        } else {
            root.join(format!("{}.{}", stem, counter))
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(CaptureError::StorageWrite {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(CaptureError::DestinationNameExhausted {
        base: root.join(stem),
    })
}
