//! Property indexes.
//!
//! Every indexed property of a record type gets one strategy, picked by
//! its declared kind:
//!
//! - [`TextIndex`]: case-folded ordered map, exact/range/pattern
//! - [`NumericIndex`]: hashed exact lookup plus ordered keys for ranges
//! - [`TemporalIndex`]: ordered timestamps plus year/month/day buckets
//! - [`BooleanIndex`]: two buckets with tolerant parsing
//! - [`FallbackIndex`]: structural equality, scans for range/pattern
//!
//! [`IndexManager`] owns the strategies and answers multi-property
//! queries by intersection.

mod boolean;
mod fallback;
mod manager;
mod numeric;
mod pattern;
mod temporal;
mod text;
mod traits;

pub use boolean::BooleanIndex;
pub use fallback::FallbackIndex;
pub use manager::{strategy_for, IndexManager, IndexStats};
pub use numeric::NumericIndex;
pub use pattern::Pattern;
pub use temporal::{CalendarBucket, TemporalIndex};
pub use text::TextIndex;
pub use traits::IndexStrategy;
