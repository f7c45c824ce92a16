pub mod disk;
pub mod record;
pub mod store;

pub use disk::DiskStorage;
pub use record::{DiscoveryOutcome, DiscoveryStatus, PrefixEntry, WhitelistRecord, WhitelistStatus};
pub use store::WhitelistStore;
