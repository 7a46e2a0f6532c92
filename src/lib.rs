//! Quasi-static time-series simulator for low-voltage feeders hosting
//! customer energy resources.
//!
//! Per timestep, a fixed-point iteration coordinates every CER's
//! autonomous voltage-dependent controls (Volt-Watt, Volt-VAr, export
//! limits, constant power factor) and storage scheduling (self-consumption,
//! time-of-use, managed/unmanaged/V2G charging) with a three-phase
//! power-flow oracle, then records voltages, line loading, curtailment and
//! energy flows into per-scenario registers.

/// TOML scenario configuration and preset definitions.
pub mod config;
pub mod curves;
pub mod devices;
pub mod error;
/// Exogenous input series and synthetic profile builders.
pub mod input;
/// I/O utilities for result export.
pub mod io;
/// Scenario driver walking the timestep loop.
pub mod scenario;
/// Convergence engine, oracle interface, registers, and metrics.
pub mod sim;
