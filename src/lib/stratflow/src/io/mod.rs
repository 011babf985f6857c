//! Runtime I/O (§4.R): geometry/time-series readers, restart snapshots, and
//! per-step output writers. These are, per the system overview, "simple
//! reader/writer modules" — their contracts are in scope, their parsing
//! logic is plain hand-rolled text/binary rather than a general-purpose
//! format crate.

pub mod geometry;
pub mod output;
pub mod snapshot;
pub mod timeseries_io;
