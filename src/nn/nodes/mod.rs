mod node_handle;
pub(in crate::nn) mod raw_node;

pub use node_handle::{ImageLayout, NodeId, NodeStats};
pub(in crate::nn) use node_handle::NodeHandle;
pub use raw_node::Init;
