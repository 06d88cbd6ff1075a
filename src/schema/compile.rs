//! Compilation of a composite schema document into components.
//!
//! Compilation runs in two passes. The first registers every global
//! definition of every merged document so references can be resolved in any
//! order; the second builds each component. All named components are built,
//! so an unresolved reference fails compilation even when no instance would
//! reach it.

use super::builtins::BuiltinType;
use super::model::{
    AttributeUse, CompiledSchema, ComplexType, Content, ElementDecl, ElementId, Facets,
    NamespaceConstraint, Particle, PatternFacet, ProcessContents, SimpleType, SimpleVariety, Term,
    TypeDef, TypeId, TypeRef, Wildcard,
};
use super::XS_NS;
use crate::error::ContractError;
use crate::parser::{QName, XmlElement, XML_NS};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Group and attribute group references nested deeper than this are treated
/// as circular.
const MAX_GROUP_DEPTH: usize = 64;

/// Compile the composite root built by the aggregator.
///
/// `sources[i]` names the file of the composite's `i`-th child document.
pub(crate) fn compile(composite: &XmlElement, sources: &[PathBuf]) -> Result<CompiledSchema, ContractError> {
    let mut compiler = Compiler::default();
    compiler.register(composite, sources)?;
    compiler.build()?;
    compiler.finish(sources)
}

struct SchemaDoc<'a> {
    source: &'a Path,
    target_namespace: Option<String>,
    elements_qualified: bool,
    attributes_qualified: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Pending,
    Building,
    Built,
}

type Raw<'a> = (usize, &'a XmlElement);

#[derive(Default)]
struct Compiler<'a> {
    docs: Vec<SchemaDoc<'a>>,

    type_ids: HashMap<QName, TypeId>,
    type_sources: Vec<Option<Raw<'a>>>,
    type_state: Vec<BuildState>,
    types: Vec<Option<TypeDef>>,

    global_elements: HashMap<QName, ElementId>,
    element_sources: Vec<(ElementId, Raw<'a>)>,
    elements: Vec<ElementDecl>,

    groups: HashMap<QName, Raw<'a>>,
    attribute_groups: HashMap<QName, Raw<'a>>,
    attributes: HashMap<QName, Raw<'a>>,

    depth: usize,
}

/// Outcome of compiling one `xs:attribute` inside a type.
enum AttributeOutcome {
    Use(AttributeUse),
    Prohibited(QName),
}

#[derive(Default)]
struct AttributeSet {
    uses: Vec<AttributeUse>,
    prohibited: Vec<QName>,
    wildcard: Option<Wildcard>,
}

impl<'a> Compiler<'a> {
    fn error(&self, doc: usize, reason: impl AsRef<str>) -> ContractError {
        ContractError::SchemaCompile(format!("{}: {}", self.docs[doc].source.display(), reason.as_ref()))
    }

    fn register(&mut self, composite: &'a XmlElement, sources: &'a [PathBuf]) -> Result<(), ContractError> {
        for (index, schema) in composite.elements().enumerate() {
            let source = sources.get(index).map(PathBuf::as_path).unwrap_or(Path::new("<composite>"));
            if !schema.is(XS_NS, "schema") {
                return Err(ContractError::SchemaCompile(format!(
                    "{}: <{}> is not an xs:schema document",
                    source.display(),
                    schema.display_name()
                )));
            }
            self.docs.push(SchemaDoc {
                source,
                target_namespace: schema.attribute("targetNamespace").filter(|ns| !ns.is_empty()).map(String::from),
                elements_qualified: schema.attribute("elementFormDefault") == Some("qualified"),
                attributes_qualified: schema.attribute("attributeFormDefault") == Some("qualified"),
            });

            for child in schema.elements().filter(|c| c.namespace() == Some(XS_NS)) {
                match child.local_name() {
                    "element" => {
                        let name = self.global_name(index, child)?;
                        self.check_unique(index, "element", &name, self.global_elements.contains_key(&name))?;
                        let id = self.elements.len();
                        self.elements.push(ElementDecl {
                            name: name.clone(),
                            type_ref: TypeRef::Builtin(BuiltinType::AnyType),
                            nillable: false,
                            default: None,
                            fixed: None,
                            is_abstract: false,
                            substitutes: Vec::new(),
                        });
                        self.global_elements.insert(name, id);
                        self.element_sources.push((id, (index, child)));
                    }
                    "complexType" | "simpleType" => {
                        let name = self.global_name(index, child)?;
                        self.check_unique(index, "type", &name, self.type_ids.contains_key(&name))?;
                        let id = self.types.len();
                        self.types.push(None);
                        self.type_state.push(BuildState::Pending);
                        self.type_sources.push(Some((index, child)));
                        self.type_ids.insert(name, id);
                    }
                    "group" => {
                        let name = self.global_name(index, child)?;
                        self.check_unique(index, "group", &name, self.groups.contains_key(&name))?;
                        self.groups.insert(name, (index, child));
                    }
                    "attributeGroup" => {
                        let name = self.global_name(index, child)?;
                        let exists = self.attribute_groups.contains_key(&name);
                        self.check_unique(index, "attribute group", &name, exists)?;
                        self.attribute_groups.insert(name, (index, child));
                    }
                    "attribute" => {
                        let name = self.global_name(index, child)?;
                        self.check_unique(index, "attribute", &name, self.attributes.contains_key(&name))?;
                        self.attributes.insert(name, (index, child));
                    }
                    "import" | "include" | "annotation" | "notation" => {}
                    "redefine" | "override" => {
                        return Err(self.error(index, format!("xs:{} is not supported", child.local_name())));
                    }
                    other => {
                        return Err(self.error(index, format!("unexpected top-level xs:{}", other)));
                    }
                }
            }
        }
        Ok(())
    }

    fn global_name(&self, doc: usize, el: &XmlElement) -> Result<QName, ContractError> {
        let name = el
            .attribute("name")
            .ok_or_else(|| self.error(doc, format!("top-level xs:{} without a name", el.local_name())))?;
        Ok(QName::new(self.docs[doc].target_namespace.as_deref(), name))
    }

    fn check_unique(&self, doc: usize, what: &str, name: &QName, exists: bool) -> Result<(), ContractError> {
        if exists {
            Err(self.error(doc, format!("duplicate global {} {}", what, name)))
        } else {
            Ok(())
        }
    }

    fn build(&mut self) -> Result<(), ContractError> {
        for id in 0..self.types.len() {
            self.ensure_type(id)?;
        }

        let element_sources = self.element_sources.clone();
        let mut memberships = Vec::new();
        let mut untyped_members = Vec::new();
        for &(id, (doc, el)) in &element_sources {
            let decl = self.element_decl(doc, el, self.elements[id].name.clone())?;
            let explicit_type = el.attribute("type").is_some()
                || el.elements().any(|c| c.is(XS_NS, "complexType") || c.is(XS_NS, "simpleType"));
            self.elements[id] = ElementDecl {
                is_abstract: is_true(el.attribute("abstract")),
                ..decl
            };

            if let Some(head) = el.attribute("substitutionGroup") {
                let head_name = el.resolve_qname(head).map_err(|e| self.error(doc, e))?;
                let head_id = *self.global_elements.get(&head_name).ok_or_else(|| {
                    self.error(doc, format!("substitution group head {} is not defined", head_name))
                })?;
                memberships.push((id, head_id));
                if !explicit_type {
                    untyped_members.push((id, head_id));
                }
            }
        }

        // Heads may be declared after their members, so link only once every
        // declaration is in place.
        for &(member, head) in &memberships {
            self.elements[head].substitutes.push(member);
        }

        // Members without their own type take the head's type; heads may
        // themselves be members, so resolve in rounds.
        for _ in 0..=untyped_members.len() {
            for &(member, head) in &untyped_members {
                let inherited = self.elements[head].type_ref;
                self.elements[member].type_ref = inherited;
            }
        }
        self.close_substitution_groups();

        let groups: Vec<_> = self.groups.values().copied().collect();
        for (doc, el) in groups {
            self.group_definition(doc, el)?;
        }
        let attribute_groups: Vec<_> = self.attribute_groups.values().copied().collect();
        for (doc, el) in attribute_groups {
            let mut set = AttributeSet::default();
            self.collect_attributes(doc, el, &mut set)?;
        }
        let attributes: Vec<_> = self.attributes.values().copied().collect();
        for (doc, el) in attributes {
            self.global_attribute(doc, el)?;
        }
        Ok(())
    }

    fn close_substitution_groups(&mut self) {
        let direct: Vec<Vec<ElementId>> = self.elements.iter().map(|e| e.substitutes.clone()).collect();
        for (head, members) in direct.iter().enumerate() {
            let mut closed = Vec::new();
            let mut stack = members.clone();
            while let Some(member) = stack.pop() {
                if member == head || closed.contains(&member) {
                    continue;
                }
                closed.push(member);
                stack.extend(direct[member].iter().copied());
            }
            closed.sort_unstable();
            self.elements[head].substitutes = closed;
        }
    }

    fn finish(self, sources: &[PathBuf]) -> Result<CompiledSchema, ContractError> {
        let types = self
            .types
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ContractError::SchemaCompile("type definition left unbuilt".to_string()))?;
        Ok(CompiledSchema {
            types,
            elements: self.elements,
            global_elements: self.global_elements,
            global_types: self.type_ids,
            sources: sources.to_vec(),
        })
    }

    // --- types ---

    fn ensure_type(&mut self, id: TypeId) -> Result<(), ContractError> {
        match self.type_state[id] {
            BuildState::Built => Ok(()),
            BuildState::Building => {
                let (doc, el) = self.type_sources[id].ok_or_else(|| {
                    ContractError::SchemaCompile("circular derivation of an anonymous type".to_string())
                })?;
                Err(self.error(
                    doc,
                    format!("circular derivation of type '{}'", el.attribute("name").unwrap_or_default()),
                ))
            }
            BuildState::Pending => {
                self.type_state[id] = BuildState::Building;
                let (doc, el) = self.type_sources[id]
                    .ok_or_else(|| ContractError::SchemaCompile("type source missing".to_string()))?;
                let name = el
                    .attribute("name")
                    .map(|n| QName::new(self.docs[doc].target_namespace.as_deref(), n));
                let def = if el.local_name() == "complexType" {
                    TypeDef::Complex(self.complex_type(doc, el, name)?)
                } else {
                    TypeDef::Simple(self.simple_type(doc, el, name)?)
                };
                self.types[id] = Some(def);
                self.type_state[id] = BuildState::Built;
                Ok(())
            }
        }
    }

    fn push_anonymous(&mut self, def: TypeDef) -> TypeRef {
        let id = self.types.len();
        self.types.push(Some(def));
        self.type_state.push(BuildState::Built);
        self.type_sources.push(None);
        TypeRef::Defined(id)
    }

    /// Resolve a QName-valued type reference.
    fn type_ref(&self, doc: usize, el: &XmlElement, raw: &str) -> Result<TypeRef, ContractError> {
        let name = el.resolve_qname(raw).map_err(|e| self.error(doc, e))?;
        if name.namespace() == Some(XS_NS) {
            return BuiltinType::from_name(&name.local_name)
                .map(TypeRef::Builtin)
                .ok_or_else(|| self.error(doc, format!("unknown built-in type xs:{}", name.local_name)));
        }
        self.type_ids
            .get(&name)
            .map(|id| TypeRef::Defined(*id))
            .ok_or_else(|| {
                self.error(
                    doc,
                    format!("type {} referenced by <{}> is not defined", name, describe(el)),
                )
            })
    }

    /// Type of an element or attribute declaration: `type` attribute, inline
    /// definition, or the given default.
    fn declared_type(&mut self, doc: usize, el: &'a XmlElement, default: TypeRef) -> Result<TypeRef, ContractError> {
        if let Some(raw) = el.attribute("type") {
            return self.type_ref(doc, el, raw);
        }
        if let Some(inline) = el.elements().find(|c| c.is(XS_NS, "complexType")) {
            let def = self.complex_type(doc, inline, None)?;
            return Ok(self.push_anonymous(TypeDef::Complex(def)));
        }
        if let Some(inline) = el.elements().find(|c| c.is(XS_NS, "simpleType")) {
            let def = self.simple_type(doc, inline, None)?;
            return Ok(self.push_anonymous(TypeDef::Simple(def)));
        }
        Ok(default)
    }

    fn simple_type_ref(&mut self, doc: usize, el: &'a XmlElement, attr: &str) -> Result<TypeRef, ContractError> {
        let type_ref = match el.attribute(attr) {
            Some(raw) => self.type_ref(doc, el, raw)?,
            None => {
                let inline = el
                    .elements()
                    .find(|c| c.is(XS_NS, "simpleType"))
                    .ok_or_else(|| self.error(doc, format!("<{}> needs a {} or an inline xs:simpleType", describe(el), attr)))?;
                let def = self.simple_type(doc, inline, None)?;
                self.push_anonymous(TypeDef::Simple(def))
            }
        };
        self.require_simple(doc, el, type_ref)?;
        Ok(type_ref)
    }

    fn require_simple(&mut self, doc: usize, el: &XmlElement, type_ref: TypeRef) -> Result<(), ContractError> {
        match type_ref {
            TypeRef::Builtin(b) if b.is_complex() => {
                Err(self.error(doc, format!("<{}> needs a simple type, found xs:anyType", describe(el))))
            }
            TypeRef::Builtin(_) => Ok(()),
            TypeRef::Defined(id) => {
                self.ensure_type(id)?;
                match &self.types[id] {
                    Some(TypeDef::Simple(_)) => Ok(()),
                    _ => Err(self.error(doc, format!("<{}> needs a simple type, found a complex type", describe(el)))),
                }
            }
        }
    }

    fn simple_type(&mut self, doc: usize, el: &'a XmlElement, name: Option<QName>) -> Result<SimpleType, ContractError> {
        let derivation = el
            .elements()
            .find(|c| c.namespace() == Some(XS_NS) && c.local_name() != "annotation")
            .ok_or_else(|| self.error(doc, "xs:simpleType without restriction, list or union"))?;

        let variety = match derivation.local_name() {
            "restriction" => {
                let base = self.simple_type_ref(doc, derivation, "base")?;
                let facets = self.facets(doc, derivation)?;
                SimpleVariety::Restriction { base, facets }
            }
            "list" => SimpleVariety::List {
                item: self.simple_type_ref(doc, derivation, "itemType")?,
            },
            "union" => {
                let mut members = Vec::new();
                if let Some(raw) = derivation.attribute("memberTypes") {
                    for member in raw.split_whitespace() {
                        let type_ref = self.type_ref(doc, derivation, member)?;
                        self.require_simple(doc, derivation, type_ref)?;
                        members.push(type_ref);
                    }
                }
                for inline in derivation.elements_named(XS_NS, "simpleType") {
                    let def = self.simple_type(doc, inline, None)?;
                    members.push(self.push_anonymous(TypeDef::Simple(def)));
                }
                if members.is_empty() {
                    return Err(self.error(doc, "xs:union without member types"));
                }
                SimpleVariety::Union { members }
            }
            other => return Err(self.error(doc, format!("unexpected xs:{} in xs:simpleType", other))),
        };

        Ok(SimpleType { name, variety })
    }

    fn facets(&self, doc: usize, restriction: &XmlElement) -> Result<Facets, ContractError> {
        let mut facets = Facets::default();
        for facet in restriction.elements().filter(|c| c.namespace() == Some(XS_NS)) {
            let value = || {
                facet
                    .attribute("value")
                    .ok_or_else(|| self.error(doc, format!("xs:{} facet without a value", facet.local_name())))
            };
            let count = || -> Result<usize, ContractError> {
                let raw = value()?;
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| self.error(doc, format!("xs:{} value '{}' is not a count", facet.local_name(), raw)))
            };
            match facet.local_name() {
                "enumeration" => facets.enumeration.push(value()?.to_string()),
                "pattern" => {
                    let source = value()?;
                    let regex = Regex::new(&translate_pattern(source))
                        .map_err(|e| self.error(doc, format!("invalid pattern '{}': {}", source, e)))?;
                    facets.patterns.push(PatternFacet {
                        source: source.to_string(),
                        regex,
                    });
                }
                "length" => facets.length = Some(count()?),
                "minLength" => facets.min_length = Some(count()?),
                "maxLength" => facets.max_length = Some(count()?),
                "totalDigits" => facets.total_digits = Some(count()?),
                "fractionDigits" => facets.fraction_digits = Some(count()?),
                "minInclusive" => facets.min_inclusive = Some(value()?.trim().to_string()),
                "maxInclusive" => facets.max_inclusive = Some(value()?.trim().to_string()),
                "minExclusive" => facets.min_exclusive = Some(value()?.trim().to_string()),
                "maxExclusive" => facets.max_exclusive = Some(value()?.trim().to_string()),
                "whiteSpace" | "annotation" | "simpleType" => {}
                "attribute" | "attributeGroup" | "anyAttribute" | "sequence" | "choice" | "all" | "group" => {}
                other => return Err(self.error(doc, format!("unsupported facet xs:{}", other))),
            }
        }
        Ok(facets)
    }

    fn complex_type(&mut self, doc: usize, el: &'a XmlElement, name: Option<QName>) -> Result<ComplexType, ContractError> {
        let mut mixed = is_true(el.attribute("mixed"));
        let is_abstract = is_true(el.attribute("abstract"));

        if let Some(simple) = el.elements().find(|c| c.is(XS_NS, "simpleContent")) {
            return self.simple_content(doc, simple, name, is_abstract);
        }

        if let Some(complex) = el.elements().find(|c| c.is(XS_NS, "complexContent")) {
            if let Some(m) = complex.attribute("mixed") {
                mixed = is_true(Some(m));
            }
            let derivation = complex
                .elements()
                .find(|c| c.is(XS_NS, "extension") || c.is(XS_NS, "restriction"))
                .ok_or_else(|| self.error(doc, "xs:complexContent without extension or restriction"))?;
            let base_raw = derivation
                .attribute("base")
                .ok_or_else(|| self.error(doc, "complex derivation without a base"))?;
            let base = self.type_ref(doc, derivation, base_raw)?;
            let (base_content, base_attributes, base_wildcard) = self.complex_base(doc, derivation, base)?;

            let own = self.model_group(doc, derivation)?;
            let mut set = AttributeSet::default();
            self.collect_attributes(doc, derivation, &mut set)?;

            let extension = derivation.local_name() == "extension";
            let content = if extension {
                match (base_content, own) {
                    (Content::Elements(b), Some(o)) => Content::Elements(Particle::once(Term::Sequence(vec![b, o]))),
                    (Content::Elements(b), None) => Content::Elements(b),
                    (Content::Empty, Some(o)) => Content::Elements(o),
                    (Content::Empty, None) => empty_content(mixed),
                    (simple @ Content::Simple(_), None) => simple,
                    (Content::Simple(_), Some(_)) => {
                        return Err(self.error(doc, "cannot extend a simple-content type with element content"));
                    }
                }
            } else {
                own.map(Content::Elements).unwrap_or_else(|| empty_content(mixed))
            };

            let wildcard = if extension {
                set.wildcard.clone().or(base_wildcard)
            } else {
                set.wildcard.clone()
            };
            return Ok(ComplexType {
                name,
                content,
                attributes: merge_attributes(base_attributes, set),
                any_attribute: wildcard,
                mixed,
                is_abstract,
            });
        }

        let content = match self.model_group(doc, el)? {
            Some(particle) => Content::Elements(particle),
            None => empty_content(mixed),
        };
        let mut set = AttributeSet::default();
        self.collect_attributes(doc, el, &mut set)?;
        let wildcard = set.wildcard.clone();

        Ok(ComplexType {
            name,
            content,
            attributes: merge_attributes(Vec::new(), set),
            any_attribute: wildcard,
            mixed,
            is_abstract,
        })
    }

    /// Content, attributes and attribute wildcard inherited from a complex base.
    fn complex_base(
        &mut self,
        doc: usize,
        derivation: &XmlElement,
        base: TypeRef,
    ) -> Result<(Content, Vec<AttributeUse>, Option<Wildcard>), ContractError> {
        match base {
            TypeRef::Builtin(BuiltinType::AnyType) => Ok((Content::Empty, Vec::new(), None)),
            TypeRef::Builtin(b) => Err(self.error(
                doc,
                format!("<{}> derives complex content from simple type xs:{}", describe(derivation), b.name()),
            )),
            TypeRef::Defined(id) => {
                self.ensure_type(id)?;
                match &self.types[id] {
                    Some(TypeDef::Complex(c)) => Ok((c.content.clone(), c.attributes.clone(), c.any_attribute.clone())),
                    _ => Err(self.error(
                        doc,
                        format!("<{}> derives complex content from a simple type", describe(derivation)),
                    )),
                }
            }
        }
    }

    fn simple_content(
        &mut self,
        doc: usize,
        simple: &'a XmlElement,
        name: Option<QName>,
        is_abstract: bool,
    ) -> Result<ComplexType, ContractError> {
        let derivation = simple
            .elements()
            .find(|c| c.is(XS_NS, "extension") || c.is(XS_NS, "restriction"))
            .ok_or_else(|| self.error(doc, "xs:simpleContent without extension or restriction"))?;
        let base_raw = derivation
            .attribute("base")
            .ok_or_else(|| self.error(doc, "simple content derivation without a base"))?;
        let base = self.type_ref(doc, derivation, base_raw)?;

        let (value_type, base_attributes, base_wildcard) = match base {
            TypeRef::Builtin(b) if b.is_complex() => {
                return Err(self.error(doc, "simple content cannot derive from xs:anyType"));
            }
            TypeRef::Builtin(_) => (base, Vec::new(), None),
            TypeRef::Defined(id) => {
                self.ensure_type(id)?;
                match &self.types[id] {
                    Some(TypeDef::Simple(_)) => (base, Vec::new(), None),
                    Some(TypeDef::Complex(ComplexType {
                        content: Content::Simple(value),
                        attributes,
                        any_attribute,
                        ..
                    })) => (*value, attributes.clone(), any_attribute.clone()),
                    _ => {
                        return Err(self.error(
                            doc,
                            format!("<{}> derives simple content from a type without simple content", describe(derivation)),
                        ));
                    }
                }
            }
        };

        let value_type = if derivation.local_name() == "restriction" {
            let facets = self.facets(doc, derivation)?;
            self.push_anonymous(TypeDef::Simple(SimpleType {
                name: None,
                variety: SimpleVariety::Restriction {
                    base: value_type,
                    facets,
                },
            }))
        } else {
            value_type
        };

        let mut set = AttributeSet::default();
        self.collect_attributes(doc, derivation, &mut set)?;
        let wildcard = set.wildcard.clone().or(base_wildcard);

        Ok(ComplexType {
            name,
            content: Content::Simple(value_type),
            attributes: merge_attributes(base_attributes, set),
            any_attribute: wildcard,
            mixed: false,
            is_abstract,
        })
    }

    // --- particles ---

    /// The model group (sequence, choice, all or group reference) directly
    /// inside `container`, if any.
    fn model_group(&mut self, doc: usize, container: &'a XmlElement) -> Result<Option<Particle>, ContractError> {
        match container
            .elements()
            .find(|c| c.namespace() == Some(XS_NS) && matches!(c.local_name(), "sequence" | "choice" | "all" | "group"))
        {
            Some(group) => Ok(Some(self.particle(doc, group)?)),
            None => Ok(None),
        }
    }

    fn particle(&mut self, doc: usize, el: &'a XmlElement) -> Result<Particle, ContractError> {
        let (min_occurs, max_occurs) = self.occurs(doc, el)?;
        let term = match el.local_name() {
            "element" => Term::Element(self.element_particle(doc, el)?),
            "sequence" => Term::Sequence(self.particles(doc, el)?),
            "choice" => Term::Choice(self.particles(doc, el)?),
            "all" => Term::All(self.particles(doc, el)?),
            "any" => Term::Any(self.wildcard(doc, el)),
            "group" => {
                let raw = el
                    .attribute("ref")
                    .ok_or_else(|| self.error(doc, "local xs:group without a ref"))?;
                let name = el.resolve_qname(raw).map_err(|e| self.error(doc, e))?;
                let (group_doc, group_el) = *self
                    .groups
                    .get(&name)
                    .ok_or_else(|| self.error(doc, format!("group {} is not defined", name)))?;
                self.enter(doc, &name)?;
                let inner = self.group_definition(group_doc, group_el);
                self.depth -= 1;
                inner?.term
            }
            other => return Err(self.error(doc, format!("unexpected xs:{} in a content model", other))),
        };
        Ok(Particle {
            min_occurs,
            max_occurs,
            term,
        })
    }

    fn particles(&mut self, doc: usize, el: &'a XmlElement) -> Result<Vec<Particle>, ContractError> {
        el.elements()
            .filter(|c| c.namespace() == Some(XS_NS) && c.local_name() != "annotation")
            .map(|c| self.particle(doc, c))
            .collect()
    }

    fn group_definition(&mut self, doc: usize, el: &'a XmlElement) -> Result<Particle, ContractError> {
        self.model_group(doc, el)?
            .ok_or_else(|| self.error(doc, format!("group '{}' has no model group", el.attribute("name").unwrap_or_default())))
    }

    fn enter(&mut self, doc: usize, name: &QName) -> Result<(), ContractError> {
        self.depth += 1;
        if self.depth > MAX_GROUP_DEPTH {
            self.depth -= 1;
            return Err(self.error(doc, format!("circular reference through group {}", name)));
        }
        Ok(())
    }

    fn occurs(&self, doc: usize, el: &XmlElement) -> Result<(u32, Option<u32>), ContractError> {
        let min = match el.attribute("minOccurs") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| self.error(doc, format!("invalid minOccurs '{}'", raw)))?,
            None => 1,
        };
        let max = match el.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => None,
            Some(raw) => Some(
                raw.parse::<u32>()
                    .map_err(|_| self.error(doc, format!("invalid maxOccurs '{}'", raw)))?,
            ),
            None => Some(1),
        };
        if max.is_some_and(|m| m < min) {
            return Err(self.error(doc, format!("maxOccurs is less than minOccurs on <{}>", describe(el))));
        }
        Ok((min, max))
    }

    fn wildcard(&self, doc: usize, el: &XmlElement) -> Wildcard {
        let target = self.docs[doc].target_namespace.clone();
        let constraint = match el.attribute("namespace").map(str::trim) {
            None | Some("##any") => NamespaceConstraint::Any,
            Some("##other") => NamespaceConstraint::Other(target),
            Some(list) => NamespaceConstraint::List(
                list.split_whitespace()
                    .map(|token| match token {
                        "##local" => None,
                        "##targetNamespace" => target.clone(),
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        let process = match el.attribute("processContents") {
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            _ => ProcessContents::Strict,
        };
        Wildcard { constraint, process }
    }

    // --- elements ---

    fn element_particle(&mut self, doc: usize, el: &'a XmlElement) -> Result<ElementId, ContractError> {
        if let Some(raw) = el.attribute("ref") {
            let name = el.resolve_qname(raw).map_err(|e| self.error(doc, e))?;
            return self
                .global_elements
                .get(&name)
                .copied()
                .ok_or_else(|| self.error(doc, format!("element {} is not defined", name)));
        }

        let local = el
            .attribute("name")
            .ok_or_else(|| self.error(doc, "local xs:element without a name or ref"))?;
        let qualified = match el.attribute("form") {
            Some(form) => form == "qualified",
            None => self.docs[doc].elements_qualified,
        };
        let namespace = if qualified {
            self.docs[doc].target_namespace.clone()
        } else {
            None
        };
        let decl = self.element_decl(doc, el, QName::new(namespace.as_deref(), local))?;
        let id = self.elements.len();
        self.elements.push(decl);
        Ok(id)
    }

    fn element_decl(&mut self, doc: usize, el: &'a XmlElement, name: QName) -> Result<ElementDecl, ContractError> {
        let type_ref = self.declared_type(doc, el, TypeRef::Builtin(BuiltinType::AnyType))?;
        Ok(ElementDecl {
            name,
            type_ref,
            nillable: is_true(el.attribute("nillable")),
            default: el.attribute("default").map(String::from),
            fixed: el.attribute("fixed").map(String::from),
            is_abstract: false,
            substitutes: Vec::new(),
        })
    }

    // --- attributes ---

    fn collect_attributes(&mut self, doc: usize, container: &'a XmlElement, set: &mut AttributeSet) -> Result<(), ContractError> {
        for child in container.elements().filter(|c| c.namespace() == Some(XS_NS)) {
            match child.local_name() {
                "attribute" => match self.attribute_use(doc, child)? {
                    AttributeOutcome::Use(attr) => {
                        set.uses.retain(|a| a.name != attr.name);
                        set.uses.push(attr);
                    }
                    AttributeOutcome::Prohibited(name) => set.prohibited.push(name),
                },
                "attributeGroup" => {
                    let raw = child
                        .attribute("ref")
                        .ok_or_else(|| self.error(doc, "nested xs:attributeGroup without a ref"))?;
                    let name = child.resolve_qname(raw).map_err(|e| self.error(doc, e))?;
                    let (group_doc, group_el) = *self
                        .attribute_groups
                        .get(&name)
                        .ok_or_else(|| self.error(doc, format!("attribute group {} is not defined", name)))?;
                    self.enter(doc, &name)?;
                    let result = self.collect_attributes(group_doc, group_el, set);
                    self.depth -= 1;
                    result?;
                }
                "anyAttribute" => set.wildcard = Some(self.wildcard(doc, child)),
                _ => {}
            }
        }
        Ok(())
    }

    fn attribute_use(&mut self, doc: usize, el: &'a XmlElement) -> Result<AttributeOutcome, ContractError> {
        let usage = el.attribute("use").unwrap_or("optional");

        let (name, type_ref, global_default, global_fixed) = if let Some(raw) = el.attribute("ref") {
            let name = el.resolve_qname(raw).map_err(|e| self.error(doc, e))?;
            if name.namespace() == Some(XML_NS) {
                (name, TypeRef::Builtin(BuiltinType::String), None, None)
            } else {
                let (global_doc, global_el) = *self
                    .attributes
                    .get(&name)
                    .ok_or_else(|| self.error(doc, format!("attribute {} is not defined", name)))?;
                let global = self.global_attribute(global_doc, global_el)?;
                (name, global.type_ref, global.default, global.fixed)
            }
        } else {
            let local = el
                .attribute("name")
                .ok_or_else(|| self.error(doc, "xs:attribute without a name or ref"))?;
            let qualified = match el.attribute("form") {
                Some(form) => form == "qualified",
                None => self.docs[doc].attributes_qualified,
            };
            let namespace = if qualified {
                self.docs[doc].target_namespace.clone()
            } else {
                None
            };
            let type_ref = self.declared_type(doc, el, TypeRef::Builtin(BuiltinType::AnySimpleType))?;
            self.require_simple(doc, el, type_ref)?;
            (QName::new(namespace.as_deref(), local), type_ref, None, None)
        };

        if usage == "prohibited" {
            return Ok(AttributeOutcome::Prohibited(name));
        }
        Ok(AttributeOutcome::Use(AttributeUse {
            name,
            type_ref,
            required: usage == "required",
            default: el.attribute("default").map(String::from).or(global_default),
            fixed: el.attribute("fixed").map(String::from).or(global_fixed),
        }))
    }

    fn global_attribute(&mut self, doc: usize, el: &'a XmlElement) -> Result<AttributeUse, ContractError> {
        let name = self.global_name(doc, el)?;
        let type_ref = self.declared_type(doc, el, TypeRef::Builtin(BuiltinType::AnySimpleType))?;
        self.require_simple(doc, el, type_ref)?;
        Ok(AttributeUse {
            name,
            type_ref,
            required: false,
            default: el.attribute("default").map(String::from),
            fixed: el.attribute("fixed").map(String::from),
        })
    }
}

fn merge_attributes(base: Vec<AttributeUse>, own: AttributeSet) -> Vec<AttributeUse> {
    let mut merged: Vec<AttributeUse> = base
        .into_iter()
        .filter(|b| !own.prohibited.contains(&b.name) && !own.uses.iter().any(|o| o.name == b.name))
        .collect();
    merged.extend(own.uses);
    merged
}

fn empty_content(mixed: bool) -> Content {
    if mixed {
        Content::Elements(Particle {
            min_occurs: 1,
            max_occurs: Some(1),
            term: Term::Sequence(Vec::new()),
        })
    } else {
        Content::Empty
    }
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("true") | Some("1"))
}

fn describe(el: &XmlElement) -> String {
    match el.attribute("name").or_else(|| el.attribute("ref")) {
        Some(name) => format!("xs:{} '{}'", el.local_name(), name),
        None => format!("xs:{}", el.local_name()),
    }
}

/// Translate an XML Schema regular expression into an anchored `regex` one.
///
/// XML Schema patterns match the whole value, treat `^` and `$` as literals
/// and add the `\i` / `\c` name-character escapes.
pub(crate) fn translate_pattern(pattern: &str) -> String {
    const INITIAL: &str = r"\p{L}_:";
    const NAME_CHAR: &str = r"\p{L}\p{N}\p{M}._:\-";

    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?:");
    let mut in_class = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') if in_class => out.push_str(INITIAL),
                Some('c') if in_class => out.push_str(NAME_CHAR),
                Some('i') => out.push_str(&format!("[{}]", INITIAL)),
                Some('I') => out.push_str(&format!("[^{}]", INITIAL)),
                Some('c') => out.push_str(&format!("[{}]", NAME_CHAR)),
                Some('C') => out.push_str(&format!("[^{}]", NAME_CHAR)),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str(r"\\"),
            },
            '[' if !in_class => {
                in_class = true;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
            }
            '[' => out.push_str(r"\["),
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '^' | '$' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push_str(")$");
    out
}
