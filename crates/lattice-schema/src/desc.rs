use lattice_common::TypeId;
use serde::Serialize;

/// Handle to a registered type converter.
///
/// The schema only allocates the handle and remembers a symbolic name; the
/// conversion behavior itself is bound in the runtime's converter registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConverterId(pub u32);

/// The built-in pseudo-members that are not resolved through ordinary
/// member lookup.
///
/// Directives configure construction itself: naming an object, keying a
/// dictionary entry, supplying constructor arguments, and so on. Every
/// directive has a pre-seeded [`MemberId`](lattice_common::MemberId) in the
/// schema, allocated before any user members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Directive {
    /// Registers the object in the enclosing name scope.
    Name,
    /// Dictionary key for the object when added to a dictionary.
    Key,
    /// Subclass name for the document root. Only valid at the root.
    Class,
    /// Named constructor arguments.
    Arguments,
    /// Static factory method used instead of a constructor.
    FactoryMethod,
    /// Initialization text converted to the object via its type converter.
    Initialization,
    /// Items of a collection or dictionary object.
    Items,
    /// Ordered constructor arguments matched against parameters by arity.
    PositionalParameters,
    /// Whitespace-handling hint. Idempotent: re-assignment is allowed.
    Space,
}

impl Directive {
    /// All directives, in seeding order. Index here matches the pre-seeded
    /// member id.
    pub const ALL: [Directive; 9] = [
        Directive::Name,
        Directive::Key,
        Directive::Class,
        Directive::Arguments,
        Directive::FactoryMethod,
        Directive::Initialization,
        Directive::Items,
        Directive::PositionalParameters,
        Directive::Space,
    ];

    /// The directive's markup name (as written with an `@` sigil in the
    /// node-script format, or `x:` prefix in markup).
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Name => "Name",
            Directive::Key => "Key",
            Directive::Class => "Class",
            Directive::Arguments => "Arguments",
            Directive::FactoryMethod => "FactoryMethod",
            Directive::Initialization => "Initialization",
            Directive::Items => "Items",
            Directive::PositionalParameters => "PositionalParameters",
            Directive::Space => "Space",
        }
    }

    /// Look a directive up by its markup name.
    pub fn from_name(name: &str) -> Option<Directive> {
        Directive::ALL.iter().copied().find(|d| d.name() == name)
    }
}

/// One ordered constructor parameter of a type.
#[derive(Debug, Clone, Serialize)]
pub struct CtorParam {
    pub name: String,
    pub ty: TypeId,
}

/// Descriptor for a markup type: its identity plus capability flags.
///
/// Descriptors are arena-allocated in the [`Schema`](crate::Schema) and
/// referenced by [`TypeId`] everywhere else; the table is immutable once
/// built, so a writer session never observes a descriptor changing.
#[derive(Debug, Clone, Serialize)]
pub struct TypeDesc {
    pub namespace: String,
    pub name: String,
    /// Base type for assignability checks, if any.
    pub base: Option<TypeId>,
    /// Whether the runtime can construct instances of this type.
    pub constructible: bool,
    /// Whether instances accept ordered item adds.
    pub collection: bool,
    /// Whether instances accept keyed entry adds.
    pub dictionary: bool,
    /// Whether the constructed instance is a placeholder that must be
    /// replaced by calling provide-value before use.
    pub markup_extension: bool,
    /// Converter used for `Initialization` text, if the type has one.
    pub converter: Option<ConverterId>,
    /// Item type of a collection or dictionary.
    pub item_type: Option<TypeId>,
    /// Key type of a dictionary.
    pub key_type: Option<TypeId>,
    /// Ordered constructor parameters, matched positionally by arity.
    pub ctor_params: Vec<CtorParam>,
}

impl TypeDesc {
    /// `namespace:Name` display form used in diagnostics.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.namespace, self.name)
        }
    }
}

/// Descriptor for a member: its identity, value type, and capability flags.
#[derive(Debug, Clone, Serialize)]
pub struct MemberDesc {
    pub name: String,
    /// Owning type. `None` for directives, which belong to no type.
    pub owner: Option<TypeId>,
    /// Declared value type. `None` for directives.
    pub ty: Option<TypeId>,
    /// Which directive this member is, if it is one.
    pub directive: Option<Directive>,
    /// Settable on instances of types other than the owner.
    pub attachable: bool,
    /// An event hookup rather than a value slot.
    pub event: bool,
    /// The member's type accepts ordered item adds.
    pub collection: bool,
    /// The member's type accepts keyed entry adds.
    pub dictionary: bool,
    /// Content for this member is captured verbatim and materialized on
    /// demand instead of being constructed eagerly.
    pub deferred: bool,
    /// Converter applied to scalar text assigned to this member.
    pub converter: Option<ConverterId>,
}

impl MemberDesc {
    /// Whether this member is a directive.
    pub fn is_directive(&self) -> bool {
        self.directive.is_some()
    }
}
