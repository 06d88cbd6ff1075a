//! Compiled schema components.
//!
//! Components live in arenas on [`CompiledSchema`] and refer to each other by
//! index, so recursive content models need no reference counting.

use super::builtins::BuiltinType;
use crate::parser::QName;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

pub type TypeId = usize;
pub type ElementId = usize;

/// Reference to a simple or complex type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Builtin(BuiltinType),
    Defined(TypeId),
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Simple(SimpleType),
    Complex(ComplexType),
}

impl TypeDef {
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(t) => t.name.as_ref(),
            TypeDef::Complex(t) => t.name.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: Option<QName>,
    pub variety: SimpleVariety,
}

#[derive(Debug, Clone)]
pub enum SimpleVariety {
    /// Restriction of a base simple type by facets
    Restriction { base: TypeRef, facets: Facets },
    /// Whitespace-separated list of item values
    List { item: TypeRef },
    /// Value must satisfy at least one member type
    Union { members: Vec<TypeRef> },
}

/// A `pattern` facet with its source text kept for diagnostics.
#[derive(Debug, Clone)]
pub struct PatternFacet {
    pub source: String,
    pub regex: Regex,
}

/// Constraining facets of one restriction step.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    /// Alternatives; a value must match at least one
    pub patterns: Vec<PatternFacet>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub total_digits: Option<usize>,
    pub fraction_digits: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: Option<QName>,
    pub content: Content,
    pub attributes: Vec<AttributeUse>,
    pub any_attribute: Option<Wildcard>,
    pub mixed: bool,
    pub is_abstract: bool,
}

#[derive(Debug, Clone)]
pub enum Content {
    /// No element or text children
    Empty,
    /// Text only, of the given simple type
    Simple(TypeRef),
    /// Element children described by a particle
    Elements(Particle),
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub min_occurs: u32,
    /// `None` means unbounded
    pub max_occurs: Option<u32>,
    pub term: Term,
}

impl Particle {
    pub fn once(term: Term) -> Self {
        Self {
            min_occurs: 1,
            max_occurs: Some(1),
            term,
        }
    }

    /// Whether the particle can match no elements at all.
    pub fn is_emptiable(&self) -> bool {
        self.min_occurs == 0 || self.term.is_emptiable()
    }

    /// Number of particles in this subtree.
    pub fn size(&self) -> usize {
        1 + match &self.term {
            Term::Sequence(items) | Term::Choice(items) | Term::All(items) => items.iter().map(Particle::size).sum(),
            Term::Element(_) | Term::Any(_) => 0,
        }
    }
}

impl Term {
    pub fn is_emptiable(&self) -> bool {
        match self {
            Term::Sequence(items) | Term::All(items) => items.iter().all(Particle::is_emptiable),
            Term::Choice(alternatives) => alternatives.iter().any(Particle::is_emptiable),
            Term::Element(_) | Term::Any(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementId),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
    Any(Wildcard),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    /// `##any`
    Any,
    /// `##other`: any namespace except the target namespace and no namespace
    Other(Option<String>),
    /// Explicit list, `None` standing for `##local`
    List(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub constraint: NamespaceConstraint,
    pub process: ProcessContents,
}

impl Wildcard {
    /// Whether a name in `namespace` is matched by this wildcard.
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match &self.constraint {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(target) => {
                namespace.is_some() && namespace != target.as_deref()
            }
            NamespaceConstraint::List(allowed) => allowed.iter().any(|ns| ns.as_deref() == namespace),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: QName,
    pub type_ref: TypeRef,
    pub nillable: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
    pub is_abstract: bool,
    /// Members of this element's substitution group, transitively
    pub substitutes: Vec<ElementId>,
}

#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub name: QName,
    pub type_ref: TypeRef,
    pub required: bool,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

/// The compiled, reusable form of a contract's schema set.
#[derive(Debug, Clone, Default)]
pub struct CompiledSchema {
    pub(crate) types: Vec<TypeDef>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) global_elements: HashMap<QName, ElementId>,
    pub(crate) global_types: HashMap<QName, TypeId>,
    pub(crate) sources: Vec<PathBuf>,
}

impl CompiledSchema {
    /// Files the schema was compiled from, in merge order.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Whether a global element with this name is declared.
    pub fn has_element(&self, name: &QName) -> bool {
        self.global_elements.contains_key(name)
    }

    /// Names of all global element declarations, sorted.
    pub fn element_names(&self) -> Vec<&QName> {
        let mut names: Vec<_> = self.global_elements.keys().collect();
        names.sort();
        names
    }

    /// Names of all named type definitions, sorted.
    pub fn type_names(&self) -> Vec<&QName> {
        let mut names: Vec<_> = self.global_types.keys().collect();
        names.sort();
        names
    }

    pub(crate) fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id]
    }

    pub(crate) fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id]
    }

    /// Display name of a type for diagnostics.
    pub(crate) fn type_label(&self, type_ref: TypeRef) -> TypeLabel<'_> {
        TypeLabel { schema: self, type_ref }
    }
}

pub(crate) struct TypeLabel<'a> {
    schema: &'a CompiledSchema,
    type_ref: TypeRef,
}

impl fmt::Display for TypeLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_ref {
            TypeRef::Builtin(b) => write!(f, "xs:{}", b.name()),
            TypeRef::Defined(id) => match self.schema.type_def(id).name() {
                Some(name) => write!(f, "{}", name.local_name),
                None => f.write_str("anonymous type"),
            },
        }
    }
}
