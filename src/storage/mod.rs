pub mod error;
pub mod location;
pub mod tracker;
pub mod versions;
