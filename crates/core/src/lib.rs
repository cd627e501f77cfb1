// crates/core/src/lib.rs
pub mod categories;
pub mod counts;
pub mod rows;

pub use categories::*;
pub use counts::*;
pub use rows::*;

/// Opaque numeric player identifier used by the stats API.
/// Distinct from the display gamertag, which can change over time.
pub type Xuid = i64;
