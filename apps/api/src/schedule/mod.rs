//! Dose schedule engine: rule expansion, event correlation, timing, adherence.
//! Everything below `handlers` is pure computation over an already-loaded snapshot;
//! no module here reads the clock except where a handler passes "now" in.

pub mod aggregate;
pub mod correlator;
pub mod events;
pub mod expander;
pub mod handlers;
pub mod recording;
pub mod report;
pub mod rule;
pub mod timing;
