mod backend;

pub use backend::{Backend, BackendError, InMemoryBackend};
