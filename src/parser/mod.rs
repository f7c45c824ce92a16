pub mod listing;

pub use listing::{Anchor, ChildLink, ListingPage};
