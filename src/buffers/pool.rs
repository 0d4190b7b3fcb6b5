use num_complex::Complex32;
use std::sync::{Arc, Mutex};

/// Recycles capture buffers so a full buffer can be handed to the persist
/// worker without allocating a new one on the streaming task.
pub struct SampleBufferPool {
    buffers: Arc<Mutex<Vec<Vec<Complex32>>>>,
    capacity: usize,
}

impl SampleBufferPool {
    /// `capacity` is in complex values
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(Vec::new())),
            capacity,
        }
    }

    pub fn get(&self) -> PooledSamples {
        let mut buffers = self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let buffer = buffers.pop().unwrap_or_else(|| {
            Vec::with_capacity(self.capacity)
        });

        PooledSamples {
            buffer,
            pool: self.buffers.clone(),
        }
    }

    /// Buffers currently idle in the pool
    pub fn pool_size(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Clone for SampleBufferPool {
    fn clone(&self) -> Self {
        Self {
            buffers: self.buffers.clone(),
            capacity: self.capacity,
        }
    }
}

/// Buffer on loan from a [`SampleBufferPool`]; cleared and returned on drop.
pub struct PooledSamples {
    buffer: Vec<Complex32>,
    pool: Arc<Mutex<Vec<Vec<Complex32>>>>,
}

impl Drop for PooledSamples {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        let mut pool = self.pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pool.push(buffer);
    }
}

impl std::ops::Deref for PooledSamples {
    type Target = Vec<Complex32>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledSamples {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl std::fmt::Debug for PooledSamples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSamples")
            .field("len", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}
