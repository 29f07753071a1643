//! Route handlers served next to the gate: the health probe (outside the
//! gate) and the upstream proxy fallback (behind it).

pub mod health;
pub mod proxy;
