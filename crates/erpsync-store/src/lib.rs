pub mod batch;
pub mod client;
pub mod credentials;
pub mod error;
pub mod tables;

pub use batch::{BatchUpserter, FlushReport};
pub use client::{eq, in_list, StoreClient, SELECT_PAGE_SIZE};
pub use credentials::{parse_timestamp, StoreCredentialGateway, CREDENTIALS_TABLE};
pub use error::StoreError;
