//! Pure domain rules: blood-type compatibility, donation eligibility,
//! gamification and distance-based matching.
//!
//! Nothing in here touches the database or the clock; callers pass `now`
//! and the caller identity explicitly.

mod blood_type;
mod eligibility;
mod gamification;
mod geo;

pub use blood_type::*;
pub use eligibility::*;
pub use gamification::*;
pub use geo::*;
