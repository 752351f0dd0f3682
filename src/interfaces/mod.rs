//! Outer surfaces: CSV files for the offline report and the HTTP service.

pub mod csv;
pub mod http;
