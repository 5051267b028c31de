//! Chunked CSV → PostgreSQL loader for the real-estate sales dataset.
//!
//! The pipeline is a single forward pass: [`source`] yields fixed-size
//! record batches from the input file, [`clean`] canonicalizes column names
//! and repairs the known messy fields, and [`sink`] streams each batch into
//! the destination table (replace on the first batch, append afterwards).

pub mod clean;
pub mod config;
pub mod error;
pub mod sink;
pub mod source;
