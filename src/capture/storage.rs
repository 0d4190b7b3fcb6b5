//! Raw capture files: headerless interleaved little-endian `f32` I/Q.

use num_complex::Complex32;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::COMPLEX_SIZE;
use crate::error::{CaptureError, Result};

pub fn encode_samples(samples: &[Complex32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * COMPLEX_SIZE);
    for sample in samples {
        bytes.extend_from_slice(&sample.re.to_le_bytes());
        bytes.extend_from_slice(&sample.im.to_le_bytes());
    }
    bytes
}

pub fn decode_samples(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(COMPLEX_SIZE)
        .map(|chunk| {
            let re = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let im = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            Complex32::new(re, im)
        })
        .collect()
}

/// Write the whole buffer into a freshly claimed capture file and flush it
/// to disk.
///
/// Returns the number of bytes written.
pub async fn write_capture(mut file: File, path: &Path, samples: &[Complex32]) -> Result<u64> {
    let bytes = encode_samples(samples);
    let storage_err = |source| CaptureError::StorageWrite {
        path: path.to_path_buf(),
        source,
    };

    file.write_all(&bytes).await.map_err(storage_err)?;
    file.sync_all().await.map_err(storage_err)?;

    Ok(bytes.len() as u64)
}

/// Load a capture file back into samples.
pub fn read_capture(path: &Path) -> Result<Vec<Complex32>> {
    let bytes = std::fs::read(path)?;
    Ok(decode_samples(&bytes))
}
