//! I/O utilities for result export.

pub mod export;
