pub mod pool;
pub mod registry;

pub use pool::{BufferPool, PoolStats, SlotState};
pub use registry::{CallbackRegistry, Listener, ListenerId};
