//! Cache of job results pushed by the backend, and its HTTP surface.

pub mod router;
pub mod store;

pub use router::callback_router;
pub use store::{
    CallbackNotification, CallbackStore, CallbackStoreError, InMemoryCallbackStore,
    StoredCallback,
};
