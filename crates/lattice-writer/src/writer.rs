//! The object writer: node stream in, object graph out.
//!
//! One [`ObjectWriter`] consumes one document's node stream and drives the
//! runtime to build the graph. Construction is lazy: an object scope
//! accumulates its constructor directives and early member assignments in
//! its [`Frame`], and the instance is created at `EndObject` (or earlier,
//! when a `GetObject` or name registration forces it). Anything that
//! cannot finish because a name is not registered yet parks in the
//! [`FixupGraph`] and is replayed, FIFO, as names arrive; whatever is
//! still parked when the stream ends is reported as one aggregate error.

use std::collections::VecDeque;

use lattice_common::{MemberId, Node, NodeBuffer, NodeKind, Scalar, Span, TypeId, ValueNode};
use lattice_runtime::{NameResolver, ObjId, Provided, Runtime, RuntimeError, Value};
use lattice_schema::{ConverterId, CtorParam, Directive, Schema};
use rustc_hash::FxHashMap;

use crate::defer::{DeferGate, Feed};
use crate::error::{WriteError, WriteErrorKind};
use crate::fixup::{FixupGraph, FixupKind, FixupTarget, Slot, TokenId};
use crate::frames::{BufferedItem, BufferedMember, Frame};
use crate::pending::{PendingAdd, PendingAddQueue};

/// The document-level name scope.
///
/// Names are registered by the `Name` directive and resolved by converters
/// and provide-value hooks through [`NameResolver`].
#[derive(Default)]
pub struct NameScope {
    names: FxHashMap<String, Value>,
}

impl NameScope {
    fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    fn insert(&mut self, name: String, value: Value) {
        self.names.insert(name, value);
    }
}

impl NameResolver for NameScope {
    fn resolve_name(&self, name: &str) -> Option<Value> {
        self.names.get(name).cloned()
    }
}

/// Worklist entries for the resolution loop. Tokens and parked-object
/// completions interleave in arrival order.
enum Work {
    Token(TokenId),
    Completed(ObjId),
}

/// Whether a direct container add completed or must be queued after all.
enum DirectAdd {
    Done,
    Queue(Slot, Option<(Slot, Span)>),
}

/// Builds one object graph from one node stream.
pub struct ObjectWriter<'s, R: Runtime> {
    schema: &'s Schema,
    runtime: R,
    stack: Vec<Frame>,
    gate: DeferGate,
    graph: FixupGraph,
    queue: PendingAddQueue,
    scope: NameScope,
    namespaces: Vec<(String, String)>,
    result: Option<Value>,
    class_name: Option<String>,
    pending_root: Option<Value>,
}

impl<'s, R: Runtime> ObjectWriter<'s, R> {
    pub fn new(schema: &'s Schema, runtime: R) -> Self {
        Self {
            schema,
            runtime,
            stack: Vec::new(),
            gate: DeferGate::new(),
            graph: FixupGraph::new(),
            queue: PendingAddQueue::new(),
            scope: NameScope::default(),
            namespaces: Vec::new(),
            result: None,
            class_name: None,
            pending_root: None,
        }
    }

    /// Like [`new`], but the root `StartObject` binds to `root` instead of
    /// constructing a fresh instance. The root's type must be assignable to
    /// the declared root type.
    ///
    /// [`new`]: ObjectWriter::new
    pub fn with_root(schema: &'s Schema, runtime: R, root: Value) -> Self {
        let mut writer = Self::new(schema, runtime);
        writer.pending_root = Some(root);
        writer
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn into_runtime(self) -> R {
        self.runtime
    }

    /// The `Class` directive value seen on the root, if any.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    /// Namespace declarations seen so far, in stream order.
    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    /// Consume one node. Errors are fatal: the writer is unusable after
    /// the first `Err`.
    pub fn write(&mut self, node: Node) -> Result<(), WriteError> {
        match self.gate.feed(node)? {
            Feed::Pass(node) => self.dispatch(node),
            Feed::Captured => Ok(()),
            Feed::ValueReady(span) => {
                let buffer = self.gate.take_ready();
                self.stash_buffer(buffer, span)
            }
            Feed::CaptureReady(span) => {
                let buffer = self.gate.take_ready();
                self.stash_buffer(buffer, span)?;
                self.end_member(span)
            }
        }
    }

    /// Consume a whole stream.
    pub fn write_all<I>(&mut self, nodes: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = Node>,
    {
        for node in nodes {
            self.write(node)?;
        }
        Ok(())
    }

    /// End of stream: run the completion pass over everything still parked
    /// and hand back the root value, or the aggregate unresolved-references
    /// error if any fixup never resolved.
    pub fn close(&mut self) -> Result<Value, WriteError> {
        if self.gate.is_capturing() {
            return Err(structural(
                "end of stream",
                "inside deferred content",
                Span::point(0),
            ));
        }
        if let Some(frame) = self.stack.last() {
            return Err(structural(
                "end of stream",
                "with unclosed object scopes",
                frame.span,
            ));
        }
        let scope = &self.scope;
        let ready = self.graph.completion_pass(|name| scope.contains(name));
        self.run_ready(ready)?;
        if self.graph.has_outstanding() {
            let refs = self.graph.outstanding_refs();
            // Outstanding tokens with no pending names mean the resolution
            // bookkeeping itself broke; never emit an empty aggregate.
            let Some(first) = refs.first() else {
                return Err(WriteError::new(
                    WriteErrorKind::Runtime {
                        detail: "fixup tokens left unresolved with no pending names".into(),
                    },
                    Span::point(0),
                ));
            };
            let span = first.span;
            return Err(WriteError::new(
                WriteErrorKind::UnresolvedReferences { refs },
                span,
            ));
        }
        match &self.result {
            Some(value) => Ok(value.clone()),
            None => Err(structural(
                "end of stream",
                "before any root object",
                Span::point(0),
            )),
        }
    }

    // ── Node dispatch ────────────────────────────────────────────────────

    fn dispatch(&mut self, node: Node) -> Result<(), WriteError> {
        let span = node.span;
        match node.kind {
            NodeKind::StartObject(ty) => self.start_object(ty, span),
            NodeKind::GetObject => self.get_object(span),
            NodeKind::EndObject => self.end_object(span),
            NodeKind::StartMember(member) => self.start_member(member, span),
            NodeKind::EndMember => self.end_member(span),
            NodeKind::Value(ValueNode::Scalar(scalar)) => self.value(Value::Scalar(scalar), span),
            NodeKind::Value(ValueNode::Buffer(buffer)) => self.value(Value::Buffer(buffer), span),
            NodeKind::NamespaceDecl { prefix, uri } => {
                self.namespaces.push((prefix, uri));
                Ok(())
            }
        }
    }

    fn start_object(&mut self, ty: TypeId, span: Span) -> Result<(), WriteError> {
        match self.stack.last() {
            Some(frame) => {
                if frame.member.is_none() {
                    return Err(structural("StartObject", "outside of a member scope", span));
                }
                if frame.property_value_set || frame.pending_value.is_some() {
                    return Err(structural(
                        "StartObject",
                        "where the member already has a value",
                        span,
                    ));
                }
            }
            None => {
                if self.result.is_some() {
                    return Err(structural(
                        "StartObject",
                        "after the root object already closed",
                        span,
                    ));
                }
            }
        }
        let mut frame = Frame::new(ty, span);
        if self.stack.is_empty() {
            if let Some(root) = self.pending_root.take() {
                if let Some(obj) = root.as_object() {
                    let actual = self.runtime.type_of(obj);
                    if !self.schema.is_assignable(actual, ty) {
                        return Err(WriteError::new(
                            WriteErrorKind::Runtime {
                                detail: format!(
                                    "pre-supplied root `{}` is not assignable to `{}`",
                                    self.schema.ty(actual).qualified_name(),
                                    self.schema.ty(ty).qualified_name()
                                ),
                            },
                            span,
                        ));
                    }
                    self.runtime.begin_init(obj).map_err(|e| runtime_err(e, span))?;
                    frame.began_init = true;
                }
                frame.instance = Some(root);
            }
        }
        self.stack.push(frame);
        Ok(())
    }

    fn get_object(&mut self, span: Span) -> Result<(), WriteError> {
        let member = match self.stack.last() {
            None => return Err(structural("GetObject", "outside of an object scope", span)),
            Some(frame) => match frame.member {
                None => return Err(structural("GetObject", "outside of a member scope", span)),
                Some(member) => member,
            },
        };
        let mut frame = self.stack.pop().expect("frame checked above");
        if frame.instance.is_none() {
            // Retrieval forces the enclosing object into existence early.
            self.construct_instance(&mut frame)?;
        }
        let owner = match &frame.instance {
            Some(Value::Object(obj)) => *obj,
            Some(other) => {
                return Err(WriteError::new(
                    WriteErrorKind::Runtime {
                        detail: format!("GetObject inside a {} value", other.kind_name()),
                    },
                    span,
                ))
            }
            None => {
                return Err(WriteError::new(
                    WriteErrorKind::Runtime {
                        detail: "GetObject on an object pending initialization text".into(),
                    },
                    span,
                ))
            }
        };
        let value = self
            .runtime
            .get_value(owner, member)
            .map_err(|e| runtime_err(e, span))?;
        self.stack.push(frame);
        let child_ty = match &value {
            Value::Object(obj) => self.runtime.type_of(*obj),
            other => {
                return Err(WriteError::new(
                    WriteErrorKind::Runtime {
                        detail: format!("GetObject retrieved a {} value", other.kind_name()),
                    },
                    span,
                ))
            }
        };
        let mut child = Frame::new(child_ty, span);
        child.instance = Some(value);
        child.retrieved = true;
        self.stack.push(child);
        Ok(())
    }

    fn end_object(&mut self, span: Span) -> Result<(), WriteError> {
        let Some(mut frame) = self.stack.pop() else {
            return Err(structural("EndObject", "without a matching StartObject", span));
        };
        if frame.member.is_some() {
            return Err(structural("EndObject", "inside an open member scope", span));
        }
        if frame.instance.is_none() && frame.init_parked.is_none() {
            self.construct_instance(&mut frame)?;
        }
        if let Some(token) = frame.init_parked {
            // The whole object is unconverted initialization text; its
            // eventual value flows through the token.
            let key = frame.key.clone();
            return self.deliver(Slot::Fixup(token), key, span);
        }
        let value = frame.instance.clone().expect("constructed above");
        let is_extension = self.schema.ty(frame.ty).markup_extension;
        match value {
            Value::Object(obj) => {
                if self.graph.unresolved_of(obj) > 0 {
                    // Built, but descendants are still parked: hand the
                    // parent a completion token instead of the instance.
                    let token = self.graph.new_token(
                        FixupKind::UnresolvedChildren {
                            obj,
                            began_init: frame.began_init,
                            is_extension,
                        },
                        Vec::new(),
                        span,
                    );
                    self.graph.park(obj, token);
                    self.deliver(Slot::Fixup(token), frame.key.clone(), span)
                } else {
                    self.finalize_object(
                        obj,
                        frame.began_init,
                        is_extension,
                        frame.retrieved,
                        frame.key.clone(),
                        span,
                    )
                }
            }
            other => {
                if frame.retrieved {
                    Ok(())
                } else {
                    self.deliver(Slot::Value(other), frame.key.clone(), span)
                }
            }
        }
    }

    fn start_member(&mut self, member: MemberId, span: Span) -> Result<(), WriteError> {
        let schema = self.schema;
        let desc = schema.member(member);
        let Some(frame) = self.stack.last_mut() else {
            return Err(structural("StartMember", "outside of an object scope", span));
        };
        if frame.member.is_some() {
            return Err(structural("StartMember", "inside an open member scope", span));
        }
        // Space is an idempotent hint; everything else may open only once
        // per object scope.
        let is_space = matches!(desc.directive, Some(Directive::Space));
        if !is_space && !frame.assigned.insert(member) {
            return Err(WriteError::new(
                WriteErrorKind::DuplicateMember {
                    ty: schema.ty(frame.ty).qualified_name(),
                    member: desc.name.clone(),
                },
                span,
            ));
        }
        // Events need a handler-lookup context this runtime does not carry,
        // so they are never settable from a node stream.
        if desc.event {
            return Err(WriteError::new(
                WriteErrorKind::UnsettableMember {
                    ty: schema.ty(frame.ty).qualified_name(),
                    member: desc.name.clone(),
                },
                span,
            ));
        }
        if desc.directive.is_none() && !desc.attachable {
            if let Some(owner) = desc.owner {
                if !schema.is_assignable(frame.ty, owner) {
                    return Err(WriteError::new(
                        WriteErrorKind::UnsettableMember {
                            ty: schema.ty(frame.ty).qualified_name(),
                            member: desc.name.clone(),
                        },
                        span,
                    ));
                }
            }
        }
        frame.member = Some(member);
        frame.member_span = span;
        frame.property_value_set = false;
        if desc.deferred {
            self.gate.open();
        }
        Ok(())
    }

    fn end_member(&mut self, span: Span) -> Result<(), WriteError> {
        let pending = {
            let Some(frame) = self.stack.last_mut() else {
                return Err(structural("EndMember", "outside of an object scope", span));
            };
            if frame.member.is_none() {
                return Err(structural("EndMember", "without a matching StartMember", span));
            }
            frame.pending_value.take()
        };
        if let Some((value, vspan)) = pending {
            self.deliver(Slot::Value(value), None, vspan)?;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.member = None;
            frame.property_value_set = false;
        }
        Ok(())
    }

    fn value(&mut self, value: Value, span: Span) -> Result<(), WriteError> {
        let (member, occupied) = match self.stack.last() {
            None => return Err(structural("Value", "outside of an object scope", span)),
            Some(frame) => match frame.member {
                None => return Err(structural("Value", "outside of a member scope", span)),
                Some(member) => (
                    member,
                    frame.pending_value.is_some() || frame.property_value_set,
                ),
            },
        };
        match self.schema.directive_of(member) {
            // Directive collections take values one by one, immediately.
            Some(Directive::Items | Directive::PositionalParameters | Directive::Arguments) => {
                self.deliver(Slot::Value(value), None, span)
            }
            _ => {
                if occupied {
                    return Err(structural(
                        "Value",
                        "where the member already has a value",
                        span,
                    ));
                }
                if let Some(frame) = self.stack.last_mut() {
                    frame.pending_value = Some((value, span));
                }
                Ok(())
            }
        }
    }

    fn stash_buffer(&mut self, buffer: NodeBuffer, span: Span) -> Result<(), WriteError> {
        let Some(frame) = self.stack.last_mut() else {
            return Err(structural("Value", "outside of an object scope", span));
        };
        if frame.pending_value.is_some() || frame.property_value_set {
            return Err(structural(
                "Value",
                "where the member already has a value",
                span,
            ));
        }
        frame.pending_value = Some((Value::Buffer(buffer), span));
        Ok(())
    }

    // ── Delivery ─────────────────────────────────────────────────────────

    /// Route a finished (or parked) value into the open member of the
    /// current frame, or to the document root when no frame is open.
    /// `child_key` is the closing child's `Key` directive value, if any.
    fn deliver(
        &mut self,
        slot: Slot,
        child_key: Option<(Slot, Span)>,
        span: Span,
    ) -> Result<(), WriteError> {
        let (member, instance) = match self.stack.last() {
            None => {
                match slot {
                    Slot::Value(value) => self.result = Some(value),
                    Slot::Fixup(token) => self.graph.retarget(token, FixupTarget::Root),
                }
                return Ok(());
            }
            Some(frame) => {
                let Some(member) = frame.member else {
                    return Err(structural("value", "outside of a member scope", span));
                };
                (member, frame.instance.clone())
            }
        };
        match self.schema.directive_of(member) {
            Some(Directive::Items) => match instance {
                Some(Value::Object(container)) => {
                    self.add_or_queue(container, slot, child_key, span)
                }
                Some(other) => Err(WriteError::new(
                    WriteErrorKind::Runtime {
                        detail: format!("cannot add items to a {} value", other.kind_name()),
                    },
                    span,
                )),
                None => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.items_buffer.push(BufferedItem {
                            item: slot,
                            key: child_key,
                            span,
                        });
                    }
                    Ok(())
                }
            },
            Some(Directive::PositionalParameters) => {
                if instance.is_some() {
                    return Err(constructed_too_late("PositionalParameters", span));
                }
                let Slot::Value(value) = slot else {
                    return Err(WriteError::new(
                        WriteErrorKind::Conversion {
                            detail: "forward reference is not allowed in constructor arguments"
                                .into(),
                        },
                        span,
                    ));
                };
                if let Some(frame) = self.stack.last_mut() {
                    frame.positional.push((value, span));
                }
                Ok(())
            }
            Some(Directive::Arguments) => {
                if instance.is_some() {
                    return Err(constructed_too_late("Arguments", span));
                }
                let Slot::Value(value) = slot else {
                    return Err(WriteError::new(
                        WriteErrorKind::Conversion {
                            detail: "forward reference is not allowed in constructor arguments"
                                .into(),
                        },
                        span,
                    ));
                };
                if let Some(frame) = self.stack.last_mut() {
                    frame.ctor_args.push(value);
                }
                Ok(())
            }
            Some(Directive::Key) => {
                if let Some(frame) = self.stack.last_mut() {
                    frame.key = Some((slot, span));
                }
                Ok(())
            }
            Some(Directive::Name) => {
                let name = directive_text(slot, "Name", span)?;
                match instance {
                    Some(value) => self.register_name(name, value, span),
                    None => {
                        if let Some(frame) = self.stack.last_mut() {
                            frame.name = Some((name, span));
                        }
                        Ok(())
                    }
                }
            }
            Some(Directive::Class) => {
                let class = directive_text(slot, "Class", span)?;
                if self.stack.len() != 1 {
                    return Err(WriteError::new(
                        WriteErrorKind::DirectiveMisuse {
                            directive: "Class",
                            reason: "only valid on the document root".into(),
                        },
                        span,
                    ));
                }
                self.class_name = Some(class);
                Ok(())
            }
            Some(Directive::FactoryMethod) => {
                if instance.is_some() {
                    return Err(constructed_too_late("FactoryMethod", span));
                }
                let method = directive_text(slot, "FactoryMethod", span)?;
                if let Some(frame) = self.stack.last_mut() {
                    frame.factory = Some(method);
                }
                Ok(())
            }
            Some(Directive::Initialization) => {
                if instance.is_some() {
                    return Err(constructed_too_late("Initialization", span));
                }
                let text = directive_text(slot, "Initialization", span)?;
                if let Some(frame) = self.stack.last_mut() {
                    frame.init_text = Some((text, span));
                }
                Ok(())
            }
            Some(Directive::Space) => Ok(()),
            None => self.assign_member(member, slot, span),
        }
    }

    fn assign_member(
        &mut self,
        member: MemberId,
        slot: Slot,
        span: Span,
    ) -> Result<(), WriteError> {
        let slot = self.convert_member_text(member, slot, span)?;
        let frame_ty = self.stack.last().map(|f| f.ty);
        let instance = self.stack.last().and_then(|f| f.instance.clone());
        let Some(frame) = self.stack.last_mut() else {
            return Err(structural("value", "outside of an object scope", span));
        };
        if frame.property_value_set {
            return Err(structural(
                "value",
                "where the member already has a value",
                span,
            ));
        }
        frame.property_value_set = true;
        match instance {
            None => {
                frame.buffered.push(BufferedMember { member, slot, span });
                Ok(())
            }
            Some(Value::Object(owner)) => match slot {
                Slot::Value(value) => self
                    .runtime
                    .set_value(owner, member, value)
                    .map_err(|e| runtime_err(e, span)),
                Slot::Fixup(token) => {
                    self.graph
                        .retarget(token, FixupTarget::Member { owner, member });
                    Ok(())
                }
            },
            Some(_) => Err(WriteError::new(
                WriteErrorKind::UnsettableMember {
                    ty: frame_ty
                        .map(|ty| self.schema.ty(ty).qualified_name())
                        .unwrap_or_default(),
                    member: self.schema.member(member).name.clone(),
                },
                span,
            )),
        }
    }

    /// Run the member's (or its type's) converter over raw text. A pending
    /// conversion becomes a fixup token in the slot.
    fn convert_member_text(
        &mut self,
        member: MemberId,
        slot: Slot,
        span: Span,
    ) -> Result<Slot, WriteError> {
        let text = match &slot {
            Slot::Value(Value::Scalar(Scalar::Text(text))) => text.clone(),
            _ => return Ok(slot),
        };
        let desc = self.schema.member(member);
        let converter = desc
            .converter
            .or_else(|| desc.ty.and_then(|ty| self.schema.ty(ty).converter));
        let Some(converter) = converter else {
            return Ok(slot);
        };
        match self.run_converter(converter, &text, span)? {
            Provided::Value(value) => Ok(Slot::Value(value)),
            Provided::Pending { names, assign_direct } => {
                let kind = if assign_direct && names.len() == 1 {
                    FixupKind::Simple { name: names[0].clone() }
                } else {
                    FixupKind::PropertyReconvert { converter, text }
                };
                Ok(Slot::Fixup(self.graph.new_token(kind, names, span)))
            }
        }
    }

    fn run_converter(
        &mut self,
        converter: ConverterId,
        text: &str,
        span: Span,
    ) -> Result<Provided, WriteError> {
        self.runtime
            .create_from_converted_value(converter, text, &self.scope)
            .map_err(|e| runtime_err(e, span))
    }

    // ── Construction ─────────────────────────────────────────────────────

    /// Build the frame's instance from its accumulated constructor
    /// directives, then replay the name registration and every buffered
    /// assignment against the live object.
    fn construct_instance(&mut self, frame: &mut Frame) -> Result<(), WriteError> {
        let schema = self.schema;
        let desc = schema.ty(frame.ty);
        let qualified = desc.qualified_name();

        if frame.init_text.is_some() && !frame.buffered.is_empty() {
            return Err(WriteError::new(
                WriteErrorKind::DirectiveMisuse {
                    directive: "Initialization",
                    reason: "cannot be combined with member assignments".into(),
                },
                frame.span,
            ));
        }
        if !frame.positional.is_empty() && !frame.ctor_args.is_empty() {
            return Err(WriteError::new(
                WriteErrorKind::DirectiveMisuse {
                    directive: "PositionalParameters",
                    reason: "cannot be combined with Arguments".into(),
                },
                frame.span,
            ));
        }

        let instance = if let Some(method) = frame.factory.take() {
            let args = std::mem::take(&mut frame.ctor_args);
            Value::Object(
                self.runtime
                    .create_with_factory(frame.ty, &method, &args)
                    .map_err(|e| ctor_err(e, qualified.clone(), frame.span))?,
            )
        } else if let Some((text, tspan)) = frame.init_text.take() {
            let Some(converter) = desc.converter else {
                return Err(WriteError::new(
                    WriteErrorKind::NoConstructor {
                        ty: qualified,
                        reason: "type has no converter for initialization text".into(),
                    },
                    tspan,
                ));
            };
            match self.run_converter(converter, &text, tspan)? {
                Provided::Value(value) => value,
                Provided::Pending { names, assign_direct } => {
                    let kind = if assign_direct && names.len() == 1 {
                        FixupKind::Simple { name: names[0].clone() }
                    } else {
                        FixupKind::InitializationReconvert { converter, text }
                    };
                    frame.init_parked = Some(self.graph.new_token(kind, names, tspan));
                    return Ok(());
                }
            }
        } else if !frame.positional.is_empty() {
            let positional = std::mem::take(&mut frame.positional);
            if desc.ctor_params.len() != positional.len() {
                return Err(WriteError::new(
                    WriteErrorKind::NoConstructor {
                        ty: qualified,
                        reason: format!(
                            "no constructor taking {} positional argument(s)",
                            positional.len()
                        ),
                    },
                    frame.span,
                ));
            }
            let mut args = Vec::with_capacity(positional.len());
            for (param, (value, vspan)) in desc.ctor_params.iter().zip(positional) {
                args.push(self.convert_ctor_arg(param, value, vspan)?);
            }
            Value::Object(
                self.runtime
                    .create_instance(frame.ty, &args)
                    .map_err(|e| ctor_err(e, qualified.clone(), frame.span))?,
            )
        } else {
            let args = std::mem::take(&mut frame.ctor_args);
            Value::Object(
                self.runtime
                    .create_instance(frame.ty, &args)
                    .map_err(|e| ctor_err(e, qualified.clone(), frame.span))?,
            )
        };

        frame.instance = Some(instance.clone());
        let obj = match instance {
            Value::Object(obj) => obj,
            other => {
                // Converter-produced leaf: name it if asked, nothing to
                // replay.
                if let Some((name, nspan)) = frame.name.take() {
                    self.register_name(name, other, nspan)?;
                }
                return Ok(());
            }
        };

        self.runtime
            .begin_init(obj)
            .map_err(|e| runtime_err(e, frame.span))?;
        frame.began_init = true;

        // Registration first: buffered slots may hold tokens that wait on
        // this very name (self-reference), and those resolve into cells the
        // replay below claims.
        if let Some((name, nspan)) = frame.name.take() {
            self.register_name(name, Value::Object(obj), nspan)?;
        }
        let buffered = std::mem::take(&mut frame.buffered);
        for BufferedMember { member, slot, span } in buffered {
            match slot {
                Slot::Value(value) => self
                    .runtime
                    .set_value(obj, member, value)
                    .map_err(|e| runtime_err(e, span))?,
                Slot::Fixup(token) => match self.graph.take_cell(token) {
                    Some(value) => self
                        .runtime
                        .set_value(obj, member, value)
                        .map_err(|e| runtime_err(e, span))?,
                    None => self
                        .graph
                        .retarget(token, FixupTarget::Member { owner: obj, member }),
                },
            }
        }
        let items = std::mem::take(&mut frame.items_buffer);
        for BufferedItem { item, key, span } in items {
            self.add_or_queue(obj, item, key, span)?;
        }
        Ok(())
    }

    fn convert_ctor_arg(
        &mut self,
        param: &CtorParam,
        value: Value,
        span: Span,
    ) -> Result<Value, WriteError> {
        let Some(text) = value.as_text().map(str::to_string) else {
            return Ok(value);
        };
        let Some(converter) = self.schema.ty(param.ty).converter else {
            return Ok(value);
        };
        match self.run_converter(converter, &text, span)? {
            Provided::Value(value) => Ok(value),
            Provided::Pending { .. } => Err(WriteError::new(
                WriteErrorKind::Conversion {
                    detail: format!(
                        "constructor argument `{}` cannot wait on unresolved names",
                        param.name
                    ),
                },
                span,
            )),
        }
    }

    /// Post-construction steps of a fully resolved object: drain its
    /// pending adds, end init, evaluate provide-value, hand the result up.
    fn finalize_object(
        &mut self,
        obj: ObjId,
        began_init: bool,
        is_extension: bool,
        retrieved: bool,
        key: Option<(Slot, Span)>,
        span: Span,
    ) -> Result<(), WriteError> {
        if self.queue.is_pending(obj) {
            self.drain_container(obj, span)?;
        }
        if began_init {
            self.runtime.end_init(obj).map_err(|e| runtime_err(e, span))?;
        }
        if retrieved {
            // Already sitting in the parent; nothing to deliver.
            return Ok(());
        }
        let slot = if is_extension {
            match self
                .runtime
                .call_provide_value(obj, &self.scope)
                .map_err(|e| runtime_err(e, span))?
            {
                Provided::Value(value) => Slot::Value(value),
                Provided::Pending { names, assign_direct } => {
                    let kind = if assign_direct && names.len() == 1 {
                        FixupKind::Simple { name: names[0].clone() }
                    } else {
                        FixupKind::ExtensionFirstRun { ext: obj }
                    };
                    Slot::Fixup(self.graph.new_token(kind, names, span))
                }
            }
        } else {
            Slot::Value(Value::Object(obj))
        };
        self.deliver(slot, key, span)
    }

    // ── Name registration and fixup resolution ───────────────────────────

    fn register_name(&mut self, name: String, value: Value, span: Span) -> Result<(), WriteError> {
        if self.scope.contains(&name) {
            return Err(WriteError::new(WriteErrorKind::DuplicateName { name }, span));
        }
        self.scope.insert(name.clone(), value);
        let ready = self.graph.on_name_registered(&name);
        self.run_ready(ready)
    }

    /// The resolution loop. Runnable tokens and completed parked objects
    /// interleave on one FIFO worklist, so chains of dependent objects
    /// finish in registration order.
    fn run_ready(&mut self, initial: Vec<TokenId>) -> Result<(), WriteError> {
        let mut work: VecDeque<Work> = initial.into_iter().map(Work::Token).collect();
        while let Some(item) = work.pop_front() {
            match item {
                Work::Token(token) => self.run_token(token, &mut work)?,
                Work::Completed(obj) => self.finish_parked(obj, &mut work)?,
            }
        }
        Ok(())
    }

    fn run_token(&mut self, token: TokenId, work: &mut VecDeque<Work>) -> Result<(), WriteError> {
        let (kind, span) = {
            let t = self.graph.token(token);
            (t.kind.clone(), t.span)
        };
        let provided = match kind {
            FixupKind::Simple { name } => match self.scope.resolve_name(&name) {
                Some(value) => Provided::Value(value),
                None => Provided::Pending {
                    names: vec![name],
                    assign_direct: true,
                },
            },
            FixupKind::ExtensionFirstRun { ext } | FixupKind::ExtensionRerun { ext } => self
                .runtime
                .call_provide_value(ext, &self.scope)
                .map_err(|e| runtime_err(e, span))?,
            FixupKind::PropertyReconvert { converter, text }
            | FixupKind::InitializationReconvert { converter, text } => {
                self.run_converter(converter, &text, span)?
            }
            FixupKind::UnresolvedChildren { .. } => {
                // Completion tokens resolve through dependency counts,
                // never through the ready list.
                debug_assert!(false, "completion token on the ready list");
                return Ok(());
            }
        };
        match provided {
            Provided::Pending { names, .. } => {
                self.graph.repend(token, names);
                Ok(())
            }
            Provided::Value(value) => self.apply_resolved(token, value, work),
        }
    }

    /// Put a token's final value where its target says, then propagate any
    /// parked-object completion that resolving it caused.
    fn apply_resolved(
        &mut self,
        token: TokenId,
        value: Value,
        work: &mut VecDeque<Work>,
    ) -> Result<(), WriteError> {
        let span = self.graph.token(token).span;
        let (target, completed) = self.graph.resolve(token);
        match target {
            FixupTarget::Cell => self.graph.store_cell(token, value),
            FixupTarget::Member { owner, member } => self
                .runtime
                .set_value(owner, member, value)
                .map_err(|e| runtime_err(e, span))?,
            FixupTarget::Item { container, index } => {
                self.queue.patch_item(container, index, value)
            }
            FixupTarget::Key { container, index } => self.queue.patch_key(container, index, value),
            FixupTarget::Root => self.result = Some(value),
        }
        if let Some(obj) = completed {
            work.push_back(Work::Completed(obj));
        }
        Ok(())
    }

    /// A parked object's last dependency cleared: run its deferred
    /// finalization and deliver it through its completion token.
    fn finish_parked(&mut self, obj: ObjId, work: &mut VecDeque<Work>) -> Result<(), WriteError> {
        let Some(token) = self.graph.take_parked(obj) else {
            return Ok(());
        };
        let (began_init, is_extension, span) = {
            let t = self.graph.token(token);
            let FixupKind::UnresolvedChildren { began_init, is_extension, .. } = t.kind else {
                return Ok(());
            };
            (began_init, is_extension, t.span)
        };
        if self.queue.is_pending(obj) {
            self.drain_container(obj, span)?;
        }
        if began_init {
            self.runtime.end_init(obj).map_err(|e| runtime_err(e, span))?;
        }
        if !is_extension {
            return self.apply_resolved(token, Value::Object(obj), work);
        }
        match self
            .runtime
            .call_provide_value(obj, &self.scope)
            .map_err(|e| runtime_err(e, span))?
        {
            Provided::Value(value) => self.apply_resolved(token, value, work),
            Provided::Pending { names, .. } => {
                // Still waiting on names of its own. Swap in a rerun token
                // at the same target before resolving the completion token,
                // so the target's owner never momentarily hits zero.
                let target = self.graph.token(token).target.clone();
                let replacement =
                    self.graph
                        .new_token(FixupKind::ExtensionRerun { ext: obj }, names, span);
                self.graph.retarget(replacement, target);
                let (_, completed) = self.graph.resolve(token);
                debug_assert!(completed.is_none());
                Ok(())
            }
        }
    }

    // ── Container adds ───────────────────────────────────────────────────

    /// Add an item to a live container, or queue the add when it (or any
    /// earlier add) cannot run yet. Queuing is sticky per container so the
    /// markup's insertion order survives resolution.
    fn add_or_queue(
        &mut self,
        container: ObjId,
        item: Slot,
        key: Option<(Slot, Span)>,
        span: Span,
    ) -> Result<(), WriteError> {
        // A buffered fixup may have resolved into its cell while the
        // container was still unconstructed; claim the stored value so the
        // add runs instead of queueing a dead token.
        let item = self.claim_cell(item);
        let key = key.map(|(slot, kspan)| (self.claim_cell(slot), kspan));
        let (is_dictionary, key_ty, item_ty) = {
            let desc = self.schema.ty(self.runtime.type_of(container));
            (desc.dictionary, desc.key_type, desc.item_type)
        };
        let key_converter = key_ty.and_then(|ty| self.schema.ty(ty).converter);

        let direct = if self.queue.is_pending(container) {
            None
        } else {
            match (&item, &key) {
                (Slot::Value(item), None) => Some((item.clone(), None)),
                (Slot::Value(item), Some((Slot::Value(key), kspan))) => {
                    Some((item.clone(), Some((key.clone(), *kspan))))
                }
                _ => None,
            }
        };
        let (item, key) = match direct {
            Some((item_value, key_value)) => {
                match self.try_direct_add(
                    container,
                    is_dictionary,
                    key_converter,
                    item_ty,
                    item_value,
                    key_value,
                    span,
                )? {
                    DirectAdd::Done => return Ok(()),
                    DirectAdd::Queue(item, key) => (item, key),
                }
            }
            None => (item, key),
        };

        let index = self.queue.push(
            container,
            PendingAdd {
                item: item.clone(),
                key: key.clone().map(|(slot, _)| slot),
                key_span: key.as_ref().map(|(_, kspan)| *kspan),
                item_ty,
                span,
            },
            key_converter,
        );
        if let Slot::Fixup(token) = item {
            self.graph
                .retarget(token, FixupTarget::Item { container, index });
        }
        if let Some((Slot::Fixup(token), _)) = key {
            self.graph
                .retarget(token, FixupTarget::Key { container, index });
        }
        Ok(())
    }

    /// Swap a fixup slot for its cell value if the token already resolved.
    fn claim_cell(&mut self, slot: Slot) -> Slot {
        match slot {
            Slot::Fixup(token) => match self.graph.take_cell(token) {
                Some(value) => Slot::Value(value),
                None => Slot::Fixup(token),
            },
            slot => slot,
        }
    }

    /// The unqueued fast path. A pending text conversion (item or key)
    /// demotes the add to the queue with a fixup in the affected slot.
    #[allow(clippy::too_many_arguments)]
    fn try_direct_add(
        &mut self,
        container: ObjId,
        is_dictionary: bool,
        key_converter: Option<ConverterId>,
        item_ty: Option<TypeId>,
        item: Value,
        key: Option<(Value, Span)>,
        span: Span,
    ) -> Result<DirectAdd, WriteError> {
        if is_dictionary {
            let Some((key, kspan)) = key else {
                return Err(missing_key(span));
            };
            match self
                .runtime
                .add_to_dictionary(container, key.clone(), item.clone())
            {
                Ok(()) => Ok(DirectAdd::Done),
                Err(err @ RuntimeError::KeyTypeMismatch { .. }) => {
                    // Convert the raw key once and retry.
                    let Some(text) = key.as_text().map(str::to_string) else {
                        return Err(runtime_err(err, kspan));
                    };
                    let Some(converter) = key_converter else {
                        return Err(runtime_err(err, kspan));
                    };
                    match self.run_converter(converter, &text, kspan)? {
                        Provided::Value(converted) => {
                            self.runtime
                                .add_to_dictionary(container, converted, item)
                                .map_err(|e| runtime_err(e, kspan))?;
                            Ok(DirectAdd::Done)
                        }
                        Provided::Pending { names, assign_direct } => {
                            let kind = if assign_direct && names.len() == 1 {
                                FixupKind::Simple { name: names[0].clone() }
                            } else {
                                FixupKind::PropertyReconvert { converter, text }
                            };
                            let token = self.graph.new_token(kind, names, kspan);
                            Ok(DirectAdd::Queue(
                                Slot::Value(item),
                                Some((Slot::Fixup(token), kspan)),
                            ))
                        }
                    }
                }
                Err(e) => Err(runtime_err(e, span)),
            }
        } else {
            let converter = item_ty.and_then(|ty| self.schema.ty(ty).converter);
            if let (Some(text), Some(converter)) =
                (item.as_text().map(str::to_string), converter)
            {
                match self.run_converter(converter, &text, span)? {
                    Provided::Value(converted) => {
                        self.runtime
                            .add(container, converted)
                            .map_err(|e| runtime_err(e, span))?;
                        return Ok(DirectAdd::Done);
                    }
                    Provided::Pending { names, assign_direct } => {
                        let kind = if assign_direct && names.len() == 1 {
                            FixupKind::Simple { name: names[0].clone() }
                        } else {
                            FixupKind::PropertyReconvert { converter, text }
                        };
                        let token = self.graph.new_token(kind, names, span);
                        return Ok(DirectAdd::Queue(Slot::Fixup(token), None));
                    }
                }
            }
            self.runtime
                .add(container, item)
                .map_err(|e| runtime_err(e, span))?;
            Ok(DirectAdd::Done)
        }
    }

    /// Replay a container's queued adds front to back. Every slot must be
    /// patched by now; raw text keys are converted here, with one retry per
    /// entry.
    fn drain_container(&mut self, container: ObjId, _span: Span) -> Result<(), WriteError> {
        let Some(queue) = self.queue.take(container) else {
            return Ok(());
        };
        let is_dictionary = self.schema.ty(self.runtime.type_of(container)).dictionary;
        for add in queue.adds {
            let item = match add.item {
                Slot::Value(value) => value,
                Slot::Fixup(_) => {
                    return Err(WriteError::new(
                        WriteErrorKind::Runtime {
                            detail: "container drained with an unresolved item".into(),
                        },
                        add.span,
                    ));
                }
            };
            if is_dictionary {
                let kspan = add.key_span.unwrap_or(add.span);
                let key = match add.key {
                    Some(Slot::Value(value)) => value,
                    Some(Slot::Fixup(_)) => {
                        return Err(WriteError::new(
                            WriteErrorKind::Runtime {
                                detail: "container drained with an unresolved key".into(),
                            },
                            kspan,
                        ));
                    }
                    None => return Err(missing_key(add.span)),
                };
                self.dictionary_add(container, key, item, queue.key_converter, kspan)?;
            } else {
                let item = self.convert_item_text(add.item_ty, item, add.span)?;
                self.runtime
                    .add(container, item)
                    .map_err(|e| runtime_err(e, add.span))?;
            }
        }
        Ok(())
    }

    fn dictionary_add(
        &mut self,
        container: ObjId,
        key: Value,
        item: Value,
        key_converter: Option<ConverterId>,
        span: Span,
    ) -> Result<(), WriteError> {
        match self
            .runtime
            .add_to_dictionary(container, key.clone(), item.clone())
        {
            Ok(()) => Ok(()),
            Err(err @ RuntimeError::KeyTypeMismatch { .. }) => {
                let Some(text) = key.as_text().map(str::to_string) else {
                    return Err(runtime_err(err, span));
                };
                let Some(converter) = key_converter else {
                    return Err(runtime_err(err, span));
                };
                match self.run_converter(converter, &text, span)? {
                    Provided::Value(converted) => self
                        .runtime
                        .add_to_dictionary(container, converted, item)
                        .map_err(|e| runtime_err(e, span)),
                    Provided::Pending { names, .. } => Err(WriteError::new(
                        WriteErrorKind::Conversion {
                            detail: format!(
                                "dictionary key `{}` still waits on `{}`",
                                text,
                                names.join("`, `")
                            ),
                        },
                        span,
                    )),
                }
            }
            Err(e) => Err(runtime_err(e, span)),
        }
    }

    fn convert_item_text(
        &mut self,
        item_ty: Option<TypeId>,
        item: Value,
        span: Span,
    ) -> Result<Value, WriteError> {
        let Some(text) = item.as_text().map(str::to_string) else {
            return Ok(item);
        };
        let Some(converter) = item_ty.and_then(|ty| self.schema.ty(ty).converter) else {
            return Ok(item);
        };
        match self.run_converter(converter, &text, span)? {
            Provided::Value(value) => Ok(value),
            Provided::Pending { names, .. } => Err(WriteError::new(
                WriteErrorKind::Conversion {
                    detail: format!(
                        "item text `{}` still waits on `{}`",
                        text,
                        names.join("`, `")
                    ),
                },
                span,
            )),
        }
    }
}

fn structural(node: &'static str, context: &'static str, span: Span) -> WriteError {
    WriteError::new(WriteErrorKind::UnexpectedNode { node, context }, span)
}

fn runtime_err(err: RuntimeError, span: Span) -> WriteError {
    let kind = match err {
        RuntimeError::ConversionFailed { .. } => WriteErrorKind::Conversion {
            detail: err.to_string(),
        },
        _ => WriteErrorKind::Runtime {
            detail: err.to_string(),
        },
    };
    WriteError::new(kind, span)
}

fn ctor_err(err: RuntimeError, ty: String, span: Span) -> WriteError {
    match err {
        RuntimeError::NotConstructible { .. }
        | RuntimeError::CtorArityMismatch { .. }
        | RuntimeError::UnknownFactory { .. } => WriteError::new(
            WriteErrorKind::NoConstructor {
                ty,
                reason: err.to_string(),
            },
            span,
        ),
        other => runtime_err(other, span),
    }
}

fn constructed_too_late(directive: &'static str, span: Span) -> WriteError {
    WriteError::new(
        WriteErrorKind::DirectiveMisuse {
            directive,
            reason: "object is already constructed".into(),
        },
        span,
    )
}

fn missing_key(span: Span) -> WriteError {
    WriteError::new(
        WriteErrorKind::DirectiveMisuse {
            directive: "Key",
            reason: "dictionary item has no key".into(),
        },
        span,
    )
}

fn directive_text(slot: Slot, directive: &'static str, span: Span) -> Result<String, WriteError> {
    let Slot::Value(value) = slot else {
        return Err(WriteError::new(
            WriteErrorKind::DirectiveMisuse {
                directive,
                reason: "value cannot be a forward reference".into(),
            },
            span,
        ));
    };
    match value.as_text() {
        Some(text) => Ok(text.to_string()),
        None => Err(WriteError::new(
            WriteErrorKind::DirectiveMisuse {
                directive,
                reason: format!("expected text, got {}", value.kind_name()),
            },
            span,
        )),
    }
}
