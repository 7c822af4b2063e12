//! Signal graph topology
//!
//! Describes the synthesis graph as typed nodes with explicit directed
//! connections. The render loop in [`super::graph`] follows this wiring; the
//! topology exists so the structure can be inspected and validated (acyclic,
//! every node feeds the destination) when a graph is built.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::error::{EntrainError, Result};

/// Kind of signal node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Binaural generator of harmonic layer `layer`; `right` marks the beat-offset side
    Oscillator { layer: usize, right: bool },
    LayerGain { layer: usize },
    Panner,
    IsochronicGain,
    NoiseSource { index: usize },
    LowPass { index: usize },
    NoiseGain { index: usize },
    Mixer,
    Compressor,
    ReverbSend,
    MasterGain,
    SafetyLimiter,
    AnalysisTap,
    Destination,
}

impl NodeKind {
    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Oscillator { .. } | NodeKind::NoiseSource { .. })
    }

    fn is_sink(&self) -> bool {
        matches!(self, NodeKind::Destination | NodeKind::AnalysisTap)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Oscillator { layer, right } => {
                write!(f, "osc{}{}", layer, if *right { "R" } else { "L" })
            }
            NodeKind::LayerGain { layer } => write!(f, "layer_gain{}", layer),
            NodeKind::Panner => write!(f, "panner"),
            NodeKind::IsochronicGain => write!(f, "isochronic"),
            NodeKind::NoiseSource { index } => write!(f, "noise{}", index),
            NodeKind::LowPass { index } => write!(f, "lowpass{}", index),
            NodeKind::NoiseGain { index } => write!(f, "noise_gain{}", index),
            NodeKind::Mixer => write!(f, "mixer"),
            NodeKind::Compressor => write!(f, "compressor"),
            NodeKind::ReverbSend => write!(f, "reverb"),
            NodeKind::MasterGain => write!(f, "master"),
            NodeKind::SafetyLimiter => write!(f, "limiter"),
            NodeKind::AnalysisTap => write!(f, "analyser"),
            NodeKind::Destination => write!(f, "destination"),
        }
    }
}

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

/// Directed graph of typed nodes
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphTopology {
    nodes: Vec<NodeKind>,
    connections: Vec<Connection>,
}

impl GraphTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard entrainment wiring for `harmonic_layers` layers and `noise_layers` noise sources
    pub fn standard(harmonic_layers: usize, noise_layers: usize) -> Result<Self> {
        let mut topo = Self::new();
        let panner = topo.add_node(NodeKind::Panner);
        let iso = topo.add_node(NodeKind::IsochronicGain);
        let mixer = topo.add_node(NodeKind::Mixer);

        for layer in 1..=harmonic_layers {
            let gain = topo.add_node(NodeKind::LayerGain { layer });
            for right in [false, true] {
                let osc = topo.add_node(NodeKind::Oscillator { layer, right });
                topo.connect(osc, gain)?;
            }
            topo.connect(gain, panner)?;
        }
        topo.connect(panner, iso)?;
        topo.connect(iso, mixer)?;

        for index in 0..noise_layers {
            let source = topo.add_node(NodeKind::NoiseSource { index });
            let lowpass = topo.add_node(NodeKind::LowPass { index });
            let gain = topo.add_node(NodeKind::NoiseGain { index });
            topo.connect(source, lowpass)?;
            topo.connect(lowpass, gain)?;
            topo.connect(gain, mixer)?;
        }

        let compressor = topo.add_node(NodeKind::Compressor);
        let reverb = topo.add_node(NodeKind::ReverbSend);
        let master = topo.add_node(NodeKind::MasterGain);
        let limiter = topo.add_node(NodeKind::SafetyLimiter);
        let tap = topo.add_node(NodeKind::AnalysisTap);
        let destination = topo.add_node(NodeKind::Destination);
        topo.connect(mixer, compressor)?;
        topo.connect(compressor, reverb)?;
        topo.connect(reverb, master)?;
        topo.connect(master, limiter)?;
        topo.connect(limiter, destination)?;
        topo.connect(limiter, tap)?;

        topo.validate()?;
        Ok(topo)
    }

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(kind);
        self.nodes.len() - 1
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return Err(EntrainError::InitializationFailure {
                reason: format!("connection {} -> {} references a missing node", from, to),
            });
        }
        if from == to {
            return Err(EntrainError::InitializationFailure {
                reason: format!("node {} connected to itself", self.nodes[from]),
            });
        }
        let connection = Connection { from, to };
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[NodeKind] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn node(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id).copied()
    }

    pub fn find(&self, kind: NodeKind) -> Option<NodeId> {
        self.nodes.iter().position(|k| *k == kind)
    }

    /// Nodes in processing order (Kahn's algorithm)
    pub fn processing_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for c in &self.connections {
            in_degree[c.to] += 1;
            outgoing.entry(c.from).or_default().push(c.to);
        }

        let mut queue: VecDeque<NodeId> = (0..self.nodes.len())
            .filter(|id| in_degree[*id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for next in outgoing.get(&id).into_iter().flatten() {
                in_degree[*next] -= 1;
                if in_degree[*next] == 0 {
                    queue.push_back(*next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(EntrainError::InitializationFailure {
                reason: "signal graph contains a cycle".to_string(),
            });
        }
        Ok(order)
    }

    /// Check the graph is acyclic, has one destination, and every node reaches it
    pub fn validate(&self) -> Result<()> {
        let destinations: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == NodeKind::Destination)
            .map(|(i, _)| i)
            .collect();
        if destinations.len() != 1 {
            return Err(EntrainError::InitializationFailure {
                reason: format!(
                    "signal graph needs exactly one destination, found {}",
                    destinations.len()
                ),
            });
        }

        self.processing_order()?;

        // Walk backwards from the destination
        let mut incoming: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for c in &self.connections {
            incoming.entry(c.to).or_default().push(c.from);
        }
        let mut reaches: HashSet<NodeId> = HashSet::new();
        let mut stack = destinations;
        while let Some(id) = stack.pop() {
            if reaches.insert(id) {
                stack.extend(incoming.get(&id).into_iter().flatten().copied());
            }
        }

        for (id, kind) in self.nodes.iter().enumerate() {
            if kind.is_sink() {
                if !incoming.contains_key(&id) {
                    return Err(EntrainError::InitializationFailure {
                        reason: format!("{} has no input", kind),
                    });
                }
                continue;
            }
            if !reaches.contains(&id) {
                return Err(EntrainError::InitializationFailure {
                    reason: format!("{} does not reach the destination", kind),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_topology_is_valid() {
        let topo = GraphTopology::standard(3, 3).unwrap();
        let oscillators = topo
            .nodes()
            .iter()
            .filter(|k| matches!(k, NodeKind::Oscillator { .. }))
            .count();
        assert_eq!(oscillators, 6);
        assert!(topo.find(NodeKind::SafetyLimiter).is_some());

        let order = topo.processing_order().unwrap();
        let pos = |kind| {
            let id = topo.find(kind).unwrap();
            order.iter().position(|n| *n == id).unwrap()
        };
        assert!(pos(NodeKind::Mixer) < pos(NodeKind::Compressor));
        assert!(pos(NodeKind::MasterGain) < pos(NodeKind::SafetyLimiter));
        assert!(pos(NodeKind::SafetyLimiter) < pos(NodeKind::Destination));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut topo = GraphTopology::new();
        let a = topo.add_node(NodeKind::Mixer);
        let b = topo.add_node(NodeKind::Compressor);
        let dest = topo.add_node(NodeKind::Destination);
        topo.connect(a, b).unwrap();
        topo.connect(b, a).unwrap();
        topo.connect(b, dest).unwrap();
        let err = topo.validate().unwrap_err();
        assert!(matches!(err, EntrainError::InitializationFailure { .. }));
    }

    #[test]
    fn test_dangling_node_rejected() {
        let mut topo = GraphTopology::new();
        let osc = topo.add_node(NodeKind::Oscillator {
            layer: 1,
            right: false,
        });
        let dest = topo.add_node(NodeKind::Destination);
        topo.connect(osc, dest).unwrap();
        topo.add_node(NodeKind::Panner);
        assert!(topo.validate().is_err());
    }

    #[test]
    fn test_bad_connections() {
        let mut topo = GraphTopology::new();
        let a = topo.add_node(NodeKind::Mixer);
        assert!(topo.connect(a, a).is_err());
        assert!(topo.connect(a, 7).is_err());
    }
}
