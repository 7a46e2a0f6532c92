//! CER device models: loads, PV, hybrid PV+battery, and EV systems.

/// Battery storage with a staged SOC advance.
pub mod battery;
/// The closed CER sum type and fleet container.
pub mod cer;
/// EV charger inverter and charging policies.
pub mod ev_inverter;
/// EV CER wrapper.
pub mod ev_system;
/// Hybrid inverter and battery scheduling policies.
pub mod hybrid_inverter;
/// Base grid inverter: controls, arbitration, efficiency inversion.
pub mod inverter;
/// Passive load CER.
pub mod load;
/// Meter and directed energy-flow decomposition.
pub mod meter;
/// PV panel array DC production.
pub mod pv_panel;
/// PV and hybrid CER wrappers.
pub mod pv_system;
pub mod types;
/// Vehicle driving behaviour.
pub mod vehicle;

// Re-export the main types for convenience
pub use battery::Battery;
pub use cer::{Cer, CerFleet, CircuitLabel};
pub use ev_inverter::{EvChargingPolicy, EvInverter};
pub use ev_system::EvSystem;
pub use hybrid_inverter::{HybridInverter, HybridPolicy};
pub use inverter::{Inverter, InverterSettings, OutputPriority};
pub use load::Load;
pub use meter::{EnergyFlows, FlowKind, Meter};
pub use pv_panel::PvPanels;
pub use pv_system::{HybridPvSystem, PvSystem};
pub use types::CerContext;
pub use vehicle::Vehicle;
