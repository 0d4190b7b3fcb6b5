use super::SampleFrame;
use crate::error::Result;
use async_trait::async_trait;

/// Base trait for all processing nodes in the capture chain
#[async_trait]
pub trait ProcessingNode: Send {
    /// Short identifier used for logging and metrics
    fn name(&self) -> &str;

    /// Consume one frame.
    ///
    /// Pass-through nodes return the frame to forward downstream; sinks
    /// return `None`. An error aborts stream processing.
    async fn process(&mut self, input: SampleFrame) -> Result<Option<SampleFrame>>;

    /// Called once after the input stream ends
    async fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }
}
