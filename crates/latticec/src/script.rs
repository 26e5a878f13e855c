//! Parser for the `.ltn` node-script format.
//!
//! A node script is the textual form of the flat markup stream: one stream
//! event per line, resolved against a schema as it is read. The format is
//! deliberately dumb -- no attribute sugar, no nesting syntax -- so that a
//! script corresponds one-to-one to the node sequence the writer consumes.
//!
//! ```text
//! ns d urn:demo
//! start demo:Border
//! member Child
//! start demo:Button
//! member Text
//! value "Ok"
//! endmember
//! end
//! endmember
//! end
//! ```
//!
//! Lines starting with `#` and blank lines are skipped. Directive members
//! are written with an `@` sigil: `member @Name`. Type names are
//! `namespace:Name`; a bare name resolves in the default namespace.

use lattice_common::{Node, NodeKind, Scalar, Span, TypeId, ValueNode};
use lattice_schema::{Directive, Schema};

/// A syntax or resolution error in a node script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub message: String,
    pub span: Span,
}

impl ScriptError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }
}

/// Open scopes the parser tracks while resolving member names.
enum Scope {
    Object(TypeId),
    /// A member scope, carrying the member's declared value type so that a
    /// following `get` knows what it retrieves.
    Member(Option<TypeId>),
}

/// Parse a node script into the stream the writer consumes.
///
/// Nesting is checked here because the parser maintains a scope stack
/// anyway; everything semantic (duplicates, settability, construction) is
/// the writer's business.
pub fn parse(source: &str, schema: &Schema, default_ns: &str) -> Result<Vec<Node>, ScriptError> {
    let mut nodes = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut offset = 0u32;

    for raw in source.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\n', '\r']);
        let lead = (line.len() - line.trim_start().len()) as u32;
        let trimmed = line.trim();
        let span = Span::new(offset + lead, offset + lead + trimmed.len() as u32);
        offset += raw.len() as u32;

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (trimmed, ""),
        };

        match cmd {
            "ns" => {
                let mut parts = rest.split_whitespace();
                let (Some(prefix), Some(uri), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(ScriptError::new("expected `ns <prefix> <uri>`", span));
                };
                nodes.push(Node::new(
                    NodeKind::NamespaceDecl {
                        prefix: prefix.to_string(),
                        uri: uri.to_string(),
                    },
                    span,
                ));
            }
            "start" => {
                let (ns, name) = qualify(rest, default_ns);
                let Some(ty) = schema.resolve_type(ns, name) else {
                    return Err(ScriptError::new(format!("unknown type `{ns}:{name}`"), span));
                };
                scopes.push(Scope::Object(ty));
                nodes.push(Node::new(NodeKind::StartObject(ty), span));
            }
            "get" => {
                let Some(Scope::Member(member_ty)) = scopes.last() else {
                    return Err(ScriptError::new("`get` is only valid inside a member", span));
                };
                let Some(ty) = *member_ty else {
                    return Err(ScriptError::new(
                        "`get` needs a member with a declared type",
                        span,
                    ));
                };
                scopes.push(Scope::Object(ty));
                nodes.push(Node::new(NodeKind::GetObject, span));
            }
            "end" => {
                match scopes.pop() {
                    Some(Scope::Object(_)) => {}
                    _ => return Err(ScriptError::new("`end` without an open object", span)),
                }
                nodes.push(Node::new(NodeKind::EndObject, span));
            }
            "member" => {
                let Some(Scope::Object(ty)) = scopes.last() else {
                    return Err(ScriptError::new(
                        "`member` is only valid inside an object",
                        span,
                    ));
                };
                let member = if let Some(directive) = rest.strip_prefix('@') {
                    let Some(d) = Directive::from_name(directive) else {
                        return Err(ScriptError::new(
                            format!("unknown directive `@{directive}`"),
                            span,
                        ));
                    };
                    schema.directive(d)
                } else {
                    let Some(id) = schema.resolve_member(*ty, rest) else {
                        return Err(ScriptError::new(
                            format!(
                                "type `{}` has no member `{rest}`",
                                schema.ty(*ty).qualified_name()
                            ),
                            span,
                        ));
                    };
                    id
                };
                scopes.push(Scope::Member(schema.member(member).ty));
                nodes.push(Node::new(NodeKind::StartMember(member), span));
            }
            "endmember" => {
                match scopes.pop() {
                    Some(Scope::Member(_)) => {}
                    _ => return Err(ScriptError::new("`endmember` without an open member", span)),
                }
                nodes.push(Node::new(NodeKind::EndMember, span));
            }
            "value" => {
                let scalar = parse_literal(rest).map_err(|msg| ScriptError::new(msg, span))?;
                nodes.push(Node::new(NodeKind::Value(ValueNode::Scalar(scalar)), span));
            }
            other => {
                return Err(ScriptError::new(format!("unknown command `{other}`"), span));
            }
        }
    }

    if !scopes.is_empty() {
        let what = match scopes.last() {
            Some(Scope::Object(_)) => "object",
            _ => "member",
        };
        let at = Span::point(offset);
        return Err(ScriptError::new(format!("unterminated {what} scope"), at));
    }
    Ok(nodes)
}

fn qualify<'a>(name: &'a str, default_ns: &'a str) -> (&'a str, &'a str) {
    match name.split_once(':') {
        Some((ns, bare)) => (ns, bare),
        None => (default_ns, name),
    }
}

/// Parse one `value` payload.
///
/// Quoted strings support `\"`, `\\`, `\n`, and `\t` escapes. Unquoted
/// tokens are tried as int, float, bool, and null before falling back to
/// bare text.
fn parse_literal(text: &str) -> Result<Scalar, String> {
    if text.is_empty() {
        return Err("`value` needs a literal".to_string());
    }
    if let Some(inner) = text.strip_prefix('"') {
        let Some(inner) = inner.strip_suffix('"') else {
            return Err("unterminated string literal".to_string());
        };
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                other => return Err(format!("bad escape `\\{}`", other.unwrap_or(' '))),
            }
        }
        return Ok(Scalar::Text(out));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Scalar::Int(n));
    }
    if let Ok(x) = text.parse::<f64>() {
        return Ok(Scalar::Float(x));
    }
    match text {
        "true" => Ok(Scalar::Bool(true)),
        "false" => Ok(Scalar::Bool(false)),
        "null" => Ok(Scalar::Null),
        other => Ok(Scalar::Text(other.to_string())),
    }
}
