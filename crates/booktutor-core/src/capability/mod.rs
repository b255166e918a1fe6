//! Function-calling capabilities offered to the model.

pub mod args;
pub mod registry;

pub use registry::{
    Capability, CapabilityMode, CapabilityOutcome, CapabilityRegistry, Settlement,
};
