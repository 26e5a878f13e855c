use serde::Serialize;

use crate::scalar::Scalar;
use crate::span::Span;

/// Handle to a type descriptor in the schema table.
///
/// Node streams arrive already resolved against a schema, so nodes carry
/// these index handles rather than raw names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeId(pub u32);

/// Handle to a member descriptor in the schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MemberId(pub u32);

/// One event in the flat markup stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Every kind of node the object writer consumes, in stream order.
///
/// Streams are well nested: `StartObject`/`GetObject` pairs with
/// `EndObject`, `StartMember` with `EndMember`. A `Value` or nested object
/// appears strictly inside a member scope, except under directive
/// collection members which may receive several values back to back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    /// Begin a new object of the given type. Construction is lazy; the
    /// instance is not created until its `EndObject` (or until forced).
    StartObject(TypeId),
    /// Use the current value of the enclosing member as the object,
    /// instead of constructing a new one.
    GetObject,
    /// Close the current object scope.
    EndObject,
    /// Begin assigning to a member of the current object.
    StartMember(MemberId),
    /// Close the current member scope.
    EndMember,
    /// A leaf value inside the current member scope.
    Value(ValueNode),
    /// A namespace declaration in scope for the following siblings.
    NamespaceDecl { prefix: String, uri: String },
}

/// Payload of a `Value` node.
///
/// Almost always a scalar. The `Buffer` variant carries an already-captured
/// deferred-content stream, which lets a replayed sub-stream hand a deferred
/// member its buffer as a single literal value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValueNode {
    Scalar(Scalar),
    Buffer(NodeBuffer),
}

/// A captured, finite, restartable node sequence.
///
/// Produced by the writer's deferred-content gate and handed to the owning
/// member as an opaque value; the member's consumer materializes it on
/// demand by reading it, as many times as it likes. Readers always start
/// from the beginning and observe the identical sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeBuffer {
    nodes: Vec<Node>,
}

impl NodeBuffer {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Number of captured nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A fresh reader positioned at the start of the buffer.
    pub fn reader(&self) -> NodeBufferReader<'_> {
        NodeBufferReader { buffer: self, pos: 0 }
    }
}

/// Lazily steps through a [`NodeBuffer`] from the start.
#[derive(Debug)]
pub struct NodeBufferReader<'b> {
    buffer: &'b NodeBuffer,
    pos: usize,
}

impl<'b> Iterator for NodeBufferReader<'b> {
    type Item = &'b Node;

    fn next(&mut self) -> Option<&'b Node> {
        let node = self.buffer.nodes.get(self.pos)?;
        self.pos += 1;
        Some(node)
    }
}
