//! Append-Only Model

use crate::{CoordinateList, GraphError, Node, NodeId};
use tracing::debug;

/// Dataflow graph of primitive nodes
///
/// Nodes can only reference nodes emplaced before them, so the graph is
/// acyclic and already in evaluation order. Nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct Model {
    nodes: Vec<Node>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return the handle to its full output
    pub fn emplace(&mut self, node: impl Into<Node>) -> Result<CoordinateList, GraphError> {
        let node = node.into();
        node.check_shape()?;
        for input in node.inputs() {
            self.check_coordinates(input)?;
        }

        let id = self.nodes.len();
        let size = node.output_size();
        debug!("Emplacing {} node {} (size {})", node.kind_name(), id, size);
        self.nodes.push(node);
        Ok(CoordinateList::range(id, 0, size))
    }

    /// Check that every coordinate names an existing node element
    pub fn check_coordinates(&self, coordinates: &CoordinateList) -> Result<(), GraphError> {
        for c in coordinates.iter() {
            let node = self.nodes.get(c.node).ok_or(GraphError::UnknownNode(c.node))?;
            let size = node.output_size();
            if c.element >= size {
                return Err(GraphError::ElementOutOfRange {
                    node: c.node,
                    element: c.element,
                    size,
                });
            }
        }
        Ok(())
    }

    /// The most recently emplaced node
    pub fn last_node(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Size of the sample every input node expects
    pub fn input_size(&self) -> Option<usize> {
        self.nodes.iter().find_map(|n| match n {
            Node::Input(input) => Some(input.size),
            _ => None,
        })
    }
}
