//! The deferred-content gate.
//!
//! When a member marked as deferred opens, the writer stops interpreting
//! nodes and starts capturing them verbatim instead. The gate sits in
//! front of the dispatcher: every incoming node is offered to it first,
//! and while it is capturing, nodes are swallowed into a [`NodeBuffer`].
//! Capture ends at the `EndMember` that balances the deferred member, at
//! which point the buffer becomes the member's single value.
//!
//! Two shortcuts:
//! - if the first captured node is already a `Value` carrying a buffer
//!   (a replayed sub-stream handing the capture back), that buffer is the
//!   value as-is and the member's own `EndMember` still follows normally;
//! - an immediate `EndMember` yields an empty buffer.

use lattice_common::{Node, NodeBuffer, NodeKind, Span, ValueNode};

use crate::error::{WriteError, WriteErrorKind};

/// What the gate decided about one incoming node.
#[derive(Debug)]
pub enum Feed {
    /// Gate is off; the writer interprets the node normally.
    Pass(Node),
    /// Node swallowed into the capture.
    Captured,
    /// A pre-captured buffer arrived as a literal value. The buffer is
    /// ready to take; the member's `EndMember` has not been consumed.
    ValueReady(Span),
    /// Capture finished at the member's balancing `EndMember`, which the
    /// gate consumed. The buffer is ready to take and the writer must now
    /// close the member itself.
    CaptureReady(Span),
}

enum State {
    Off,
    /// Deferred member just opened; deciding between capture and a
    /// pre-captured buffer value.
    Starting,
    /// Capturing; depth counts unbalanced opens inside the capture.
    Deferring { nodes: Vec<Node>, depth: usize },
    /// Finished buffer waiting for the writer to take it.
    Ready(NodeBuffer),
}

/// Per-writer capture state. At most one capture is live at a time: a
/// deferred member nested inside captured content is captured verbatim
/// like everything else and only interpreted if the buffer is replayed.
pub struct DeferGate {
    state: State,
}

impl DeferGate {
    pub fn new() -> Self {
        Self { state: State::Off }
    }

    /// Arm the gate; the next node begins (or short-circuits) the capture.
    pub fn open(&mut self) {
        debug_assert!(matches!(self.state, State::Off), "capture already live");
        self.state = State::Starting;
    }

    /// Offer one node. While off, nodes pass through untouched.
    pub fn feed(&mut self, node: Node) -> Result<Feed, WriteError> {
        match &mut self.state {
            State::Off => Ok(Feed::Pass(node)),
            State::Starting => match node.kind {
                NodeKind::Value(ValueNode::Buffer(buf)) => {
                    self.state = State::Ready(buf);
                    Ok(Feed::ValueReady(node.span))
                }
                NodeKind::EndMember => {
                    self.state = State::Ready(NodeBuffer::default());
                    Ok(Feed::CaptureReady(node.span))
                }
                _ => {
                    let depth = open_delta(&node.kind);
                    self.state = State::Deferring {
                        nodes: vec![node],
                        depth,
                    };
                    Ok(Feed::Captured)
                }
            },
            State::Deferring { nodes, depth } => {
                match node.kind {
                    NodeKind::StartObject(_) | NodeKind::GetObject | NodeKind::StartMember(_) => {
                        *depth += 1;
                    }
                    NodeKind::EndObject => {
                        if *depth == 0 {
                            return Err(WriteError::new(
                                WriteErrorKind::UnexpectedNode {
                                    node: "EndObject",
                                    context: "inside deferred content with no open object",
                                },
                                node.span,
                            ));
                        }
                        *depth -= 1;
                    }
                    NodeKind::EndMember => {
                        if *depth == 0 {
                            let nodes = std::mem::take(nodes);
                            self.state = State::Ready(NodeBuffer::new(nodes));
                            return Ok(Feed::CaptureReady(node.span));
                        }
                        *depth -= 1;
                    }
                    NodeKind::Value(_) | NodeKind::NamespaceDecl { .. } => {}
                }
                nodes.push(node);
                Ok(Feed::Captured)
            }
            State::Ready(_) => {
                // The writer drains Ready before feeding the next node.
                Ok(Feed::Pass(node))
            }
        }
    }

    /// Take the finished buffer. The gate turns off.
    pub fn take_ready(&mut self) -> NodeBuffer {
        match std::mem::replace(&mut self.state, State::Off) {
            State::Ready(buf) => buf,
            _ => NodeBuffer::default(),
        }
    }

    /// Whether a capture is live (a closing scope would be malformed).
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, State::Starting | State::Deferring { .. })
    }
}

impl Default for DeferGate {
    fn default() -> Self {
        Self::new()
    }
}

fn open_delta(kind: &NodeKind) -> usize {
    match kind {
        NodeKind::StartObject(_) | NodeKind::GetObject | NodeKind::StartMember(_) => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_common::{Scalar, TypeId};

    fn node(kind: NodeKind) -> Node {
        Node::new(kind, Span::new(0, 1))
    }

    fn feed_all(gate: &mut DeferGate, kinds: Vec<NodeKind>) -> Vec<&'static str> {
        kinds
            .into_iter()
            .map(|k| match gate.feed(node(k)).unwrap() {
                Feed::Pass(_) => "pass",
                Feed::Captured => "captured",
                Feed::ValueReady(_) => "value-ready",
                Feed::CaptureReady(_) => "capture-ready",
            })
            .collect()
    }

    #[test]
    fn captures_until_balancing_end_member() {
        let mut gate = DeferGate::new();
        gate.open();
        let outcomes = feed_all(
            &mut gate,
            vec![
                NodeKind::StartObject(TypeId(0)),
                NodeKind::StartMember(lattice_common::MemberId(0)),
                NodeKind::Value(ValueNode::Scalar(Scalar::Int(1))),
                NodeKind::EndMember,
                NodeKind::EndObject,
                NodeKind::EndMember,
            ],
        );
        assert_eq!(
            outcomes,
            vec!["captured", "captured", "captured", "captured", "captured", "capture-ready"]
        );
        // The balancing EndMember itself is not part of the buffer.
        assert_eq!(gate.take_ready().len(), 5);
        assert!(!gate.is_capturing());
    }

    #[test]
    fn empty_member_yields_empty_buffer() {
        let mut gate = DeferGate::new();
        gate.open();
        let outcomes = feed_all(&mut gate, vec![NodeKind::EndMember]);
        assert_eq!(outcomes, vec!["capture-ready"]);
        assert!(gate.take_ready().is_empty());
    }

    #[test]
    fn prebuilt_buffer_passes_through_as_value() {
        let mut gate = DeferGate::new();
        gate.open();
        let buf = NodeBuffer::new(vec![node(NodeKind::EndObject)]);
        let fed = gate
            .feed(node(NodeKind::Value(ValueNode::Buffer(buf))))
            .unwrap();
        assert!(matches!(fed, Feed::ValueReady(_)));
        assert_eq!(gate.take_ready().len(), 1);
        // The member's own EndMember still arrives and must pass through.
        let outcomes = feed_all(&mut gate, vec![NodeKind::EndMember]);
        assert_eq!(outcomes, vec!["pass"]);
    }

    #[test]
    fn unbalanced_end_object_is_rejected() {
        let mut gate = DeferGate::new();
        gate.open();
        gate.feed(node(NodeKind::Value(ValueNode::Scalar(Scalar::Null))))
            .unwrap();
        let err = gate.feed(node(NodeKind::EndObject)).unwrap_err();
        assert!(matches!(
            err.kind,
            WriteErrorKind::UnexpectedNode { node: "EndObject", .. }
        ));
    }
}
