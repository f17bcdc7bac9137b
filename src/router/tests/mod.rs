pub mod barrier;
pub mod graph;
pub mod path;
pub mod payment;
