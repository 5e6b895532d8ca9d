//! IP-inventory and ASN-inventory store (§4.8), backed by Postgres.

mod error;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use store::Store;
