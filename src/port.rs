//! Signal Conventions and Port Descriptions
//!
//! Every adapter publishes the inlets and outlets it expects from the host
//! as a [`PortSpec`]. The render entry point receives vectors in exactly this
//! order.

use serde::{Deserialize, Serialize};

/// Index of a port within its direction (inputs or outputs)
pub type PortId = usize;

/// Semantic signal classification of a host vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Audio-rate signal processed sample by sample
    Audio,

    /// Control voltage, sampled once per chunk or once per call
    Cv,

    /// Sustained gate, reduced to edge flags
    Gate,

    /// Short trigger pulse
    Trigger,

    /// Regular clock pulses
    Clock,
}

/// Definition of a single inlet or outlet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    pub id: PortId,

    /// Human-readable name (e.g., "timbre", "clock", "aux")
    pub name: String,

    pub kind: SignalKind,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

/// Specification of all ports for an adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a spec from ordered `(name, kind)` lists
    pub fn from_names(inputs: &[(&str, SignalKind)], outputs: &[(&str, SignalKind)]) -> Self {
        Self {
            inputs: inputs
                .iter()
                .enumerate()
                .map(|(id, (name, kind))| PortDef::new(id, *name, *kind))
                .collect(),
            outputs: outputs
                .iter()
                .enumerate()
                .map(|(id, (name, kind))| PortDef::new(id, *name, *kind))
                .collect(),
        }
    }

    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }
}
