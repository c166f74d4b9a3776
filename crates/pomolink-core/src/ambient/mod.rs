//! Ambient display support (lock-screen style widgets).

mod bridge;
mod storage;

pub use bridge::AmbientBridge;
pub use storage::{
    AmbientAction, AmbientSnapshot, AmbientStorage, FileAmbientStorage, MemoryAmbientStorage,
    PendingAction,
};
