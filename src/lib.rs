#![allow(clippy::neg_cmp_op_on_partial_ord)]
#![allow(clippy::doc_lazy_continuation)]
#![allow(clippy::needless_return)]
// src/lib.rs

// Anomaly detection engine
pub mod anomaly_detection;

// SQLite backend for the repository traits
pub mod storage;

// Maintenance CLI definitions
pub mod cli;
