use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of the subscription transport's connection state
pub trait ConnectionStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

impl ConnectionStatus for AtomicBool {
    fn is_connected(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}
