pub mod frame;
pub mod node;
pub mod shared_flag;

pub use frame::SampleFrame;
pub use node::ProcessingNode;
pub use shared_flag::SharedFlag;
