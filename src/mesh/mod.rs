pub mod codec;
pub mod event_bus;
pub mod listener;
pub mod metrics;
pub mod node;
pub mod relay;
pub mod transport;

pub use codec::{Frame, FrameCodec};
pub use event_bus::{AlertReason, EventBus, MeshEvent};
pub use listener::MeshListener;
pub use metrics::NodeMetrics;
pub use node::{CycleOutcome, Inbound, Node, NodeHandle, NodeState, NodeStatus};
pub use relay::{ForwardAttempt, MeshRelay, RelayReport};
pub use transport::{ForwardError, Neighbor, TcpTransport, Transport};
