//! Typed, namespaced records over any key-value `Backend`.
//! Backends and ciphers plug in through traits; concrete ones live in `relistruct-storage`.

pub mod cipher;
pub mod storage;
pub mod store;
pub mod value;

pub use store::{StoreError, TypedStore};
pub use value::{classify, TypeTag, TypedValue};
