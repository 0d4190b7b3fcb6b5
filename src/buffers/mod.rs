pub mod pool;

pub use pool::{PooledSamples, SampleBufferPool};
