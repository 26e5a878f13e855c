//! The fixup graph: dependency bookkeeping for parked assignments.
//!
//! Markup is written top-down, but by-name references can point at objects
//! that have not been constructed yet. Whenever an assignment cannot be
//! finished, the writer parks it here as a token; when a name registers
//! (or a parked object's last dependency clears), the graph hands back the
//! tokens that became runnable, in FIFO order. The graph is deliberately
//! not a general dependency solver: two maps and a ready list cover
//! everything the construction algorithm needs.
//!
//! The graph only does bookkeeping. Executing a token -- re-running
//! provide-value, re-converting text, assigning the named value -- is the
//! writer's job, because execution needs the runtime and the name scope.

use lattice_common::{MemberId, Span};
use lattice_runtime::{ObjId, Value};
use lattice_schema::ConverterId;
use rustc_hash::FxHashMap;

use crate::error::UnresolvedRef;

/// Handle to a fixup token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(pub u32);

/// A value that may still be a parked token.
///
/// Buffered member slots and pending collection adds hold these; the token
/// variant is patched to a real value when the fixup graph resolves it.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Fixup(TokenId),
}

/// What kind of deferred work a token represents.
#[derive(Debug, Clone, PartialEq)]
pub enum FixupKind {
    /// Assign the single named value directly once it resolves.
    Simple { name: String },
    /// A markup extension whose provide-value has never produced a value.
    ExtensionFirstRun { ext: ObjId },
    /// A markup extension re-evaluated after its own children resolved.
    ExtensionRerun { ext: ObjId },
    /// Re-run a member text conversion against the saved text.
    PropertyReconvert { converter: ConverterId, text: String },
    /// Re-run an initialization-text conversion against the saved text.
    InitializationReconvert { converter: ConverterId, text: String },
    /// The object itself is built but still has unresolved descendants.
    /// Resolves when its dependency count reaches zero, never by name.
    UnresolvedChildren {
        obj: ObjId,
        began_init: bool,
        is_extension: bool,
    },
}

/// Where a token's value goes once it is known.
#[derive(Debug, Clone, PartialEq)]
pub enum FixupTarget {
    /// Held in the graph until the owning frame constructs and claims it.
    Cell,
    /// Direct member assignment on a live instance.
    Member { owner: ObjId, member: MemberId },
    /// Patch the item of a pending collection add, by temporary index.
    Item { container: ObjId, index: usize },
    /// Patch the key of a pending dictionary add, by temporary index.
    Key { container: ObjId, index: usize },
    /// The value becomes the document root.
    Root,
}

impl FixupTarget {
    /// The instance whose dependency count this target contributes to.
    fn owner(&self) -> Option<ObjId> {
        match self {
            FixupTarget::Member { owner, .. } => Some(*owner),
            FixupTarget::Item { container, .. } | FixupTarget::Key { container, .. } => {
                Some(*container)
            }
            FixupTarget::Cell | FixupTarget::Root => None,
        }
    }
}

/// A parked unit of work waiting on one or more names (or on an object's
/// children) to become resolvable.
#[derive(Debug, Clone)]
pub struct FixupToken {
    pub kind: FixupKind,
    /// Names still outstanding. Empty for `UnresolvedChildren` tokens.
    pub remaining: Vec<String>,
    pub target: FixupTarget,
    /// Source position of the parked assignment, for diagnostics.
    pub span: Span,
}

struct TokenState {
    token: FixupToken,
    resolved: bool,
}

/// The dependency-resolution engine.
///
/// Two maps plus FIFO ordering: `by_name` indexes tokens by the names they
/// wait on, `parked` holds objects whose completion is blocked on their own
/// descendants, and per-object dependency counts tie the two together.
#[derive(Default)]
pub struct FixupGraph {
    tokens: Vec<TokenState>,
    by_name: FxHashMap<String, Vec<TokenId>>,
    /// Number of unresolved tokens anchored into each instance.
    dep_count: FxHashMap<ObjId, usize>,
    /// Parked objects and their completion tokens.
    parked: FxHashMap<ObjId, TokenId>,
    /// Values resolved before their owning frame constructed.
    cells: FxHashMap<TokenId, Value>,
    outstanding: usize,
}

impl FixupGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a new token waiting on `names`. The target starts as [`Cell`]
    /// and is retargeted once the destination is known.
    ///
    /// [`Cell`]: FixupTarget::Cell
    pub fn new_token(&mut self, kind: FixupKind, names: Vec<String>, span: Span) -> TokenId {
        let id = TokenId(self.tokens.len() as u32);
        for name in &names {
            self.by_name.entry(name.clone()).or_default().push(id);
        }
        self.tokens.push(TokenState {
            token: FixupToken {
                kind,
                remaining: names,
                target: FixupTarget::Cell,
                span,
            },
            resolved: false,
        });
        self.outstanding += 1;
        id
    }

    pub fn token(&self, id: TokenId) -> &FixupToken {
        &self.tokens[id.0 as usize].token
    }

    /// Point a token at its real destination. Anchoring into an instance
    /// raises that instance's dependency count.
    pub fn retarget(&mut self, id: TokenId, target: FixupTarget) {
        if let Some(owner) = target.owner() {
            *self.dep_count.entry(owner).or_insert(0) += 1;
        }
        self.tokens[id.0 as usize].token.target = target;
    }

    /// Number of unresolved tokens anchored into an instance.
    pub fn unresolved_of(&self, obj: ObjId) -> usize {
        self.dep_count.get(&obj).copied().unwrap_or(0)
    }

    /// Record an object as parked: built, but blocked on descendants.
    pub fn park(&mut self, obj: ObjId, completion: TokenId) {
        self.parked.insert(obj, completion);
    }

    pub fn take_parked(&mut self, obj: ObjId) -> Option<TokenId> {
        self.parked.remove(&obj)
    }

    /// Claim the value of a token that resolved before its owning frame
    /// constructed.
    pub fn take_cell(&mut self, id: TokenId) -> Option<Value> {
        self.cells.remove(&id)
    }

    /// Store a resolved value for a still-unconstructed owner to claim.
    pub fn store_cell(&mut self, id: TokenId, value: Value) {
        self.cells.insert(id, value);
    }

    /// A name just registered: drop it from every waiting token and return
    /// the tokens that became runnable, in registration (FIFO) order.
    pub fn on_name_registered(&mut self, name: &str) -> Vec<TokenId> {
        let Some(waiters) = self.by_name.remove(name) else {
            return Vec::new();
        };
        let mut ready = Vec::new();
        for id in waiters {
            let state = &mut self.tokens[id.0 as usize];
            if state.resolved {
                continue;
            }
            state.token.remaining.retain(|n| n != name);
            if state.token.remaining.is_empty() {
                ready.push(id);
            }
        }
        ready
    }

    /// Re-park a token whose execution reported a new set of pending names.
    pub fn repend(&mut self, id: TokenId, names: Vec<String>) {
        for name in &names {
            self.by_name.entry(name.clone()).or_default().push(id);
        }
        self.tokens[id.0 as usize].token.remaining = names;
    }

    /// Mark a token resolved. Returns its target and, if resolving it
    /// cleared the last dependency of a parked object, that object.
    pub fn resolve(&mut self, id: TokenId) -> (FixupTarget, Option<ObjId>) {
        let state = &mut self.tokens[id.0 as usize];
        debug_assert!(!state.resolved, "token resolved twice");
        state.resolved = true;
        self.outstanding -= 1;
        let target = state.token.target.clone();
        let mut completed = None;
        if let Some(owner) = target.owner() {
            let count = self
                .dep_count
                .get_mut(&owner)
                .expect("owner has a dependency count");
            *count -= 1;
            if *count == 0 && self.parked.contains_key(&owner) {
                completed = Some(owner);
            }
        }
        (target, completed)
    }

    /// End-of-stream pass: offer every name the resolver knows to the
    /// still-pending tokens one more time, returning any that became
    /// runnable.
    pub fn completion_pass(&mut self, knows: impl Fn(&str) -> bool) -> Vec<TokenId> {
        let mut ready = Vec::new();
        for (idx, state) in self.tokens.iter_mut().enumerate() {
            if state.resolved || state.token.remaining.is_empty() {
                continue;
            }
            state.token.remaining.retain(|n| !knows(n));
            if state.token.remaining.is_empty() {
                ready.push(TokenId(idx as u32));
            }
        }
        ready
    }

    /// Whether any token is still unresolved.
    pub fn has_outstanding(&self) -> bool {
        self.outstanding > 0
    }

    /// The still-unresolved name references, in registration order, for
    /// the aggregate end-of-stream error. Completion tokens (which wait on
    /// objects, not names) are leaves' parents and are not reported
    /// separately.
    pub fn outstanding_refs(&self) -> Vec<UnresolvedRef> {
        self.tokens
            .iter()
            .filter(|s| !s.resolved && !s.token.remaining.is_empty())
            .map(|s| UnresolvedRef {
                names: s.token.remaining.clone(),
                span: s.token.span,
            })
            .collect()
    }
}
