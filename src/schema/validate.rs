//! Instance validation against a compiled schema.
//!
//! Content models are matched with backtracking over the child element list.
//! Repetitions are matched iteratively, one occurrence after the other, so
//! long lists of siblings do not deepen the recursion.

use super::builtins::{BuiltinType, WhiteSpace};
use super::model::{
    AttributeUse, CompiledSchema, ComplexType, Content, ElementDecl, ElementId, Facets, Particle,
    ProcessContents, SimpleVariety, Term, TypeDef, TypeRef, Wildcard,
};
use crate::error::Diagnostic;
use crate::parser::{XmlElement, XSI_NS};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Matching steps allowed for any content model before giving up.
const BASE_STEPS: usize = 10_000;

/// Additional steps per child element and model particle. A deterministic
/// model visits each particle a bounded number of times per child.
const STEPS_PER_POSITION: usize = 8;

impl CompiledSchema {
    /// Validate `element` against the global element declaration of the same
    /// name.
    ///
    /// Collects at most `max_diagnostics` diagnostics.
    pub fn validate_element(&self, element: &XmlElement, max_diagnostics: usize) -> Result<(), Vec<Diagnostic>> {
        let mut run = Validation {
            schema: self,
            diagnostics: Vec::new(),
            limit: max_diagnostics.max(1),
        };
        let path = format!("/{}", element.local_name());

        match self.global_elements.get(&element.name) {
            Some(&id) => run.element(self.element(id), element, &path),
            None => run.report(
                &path,
                format!("no global element declaration for {}", element.name),
            ),
        }

        if run.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(run.diagnostics)
        }
    }
}

struct Validation<'s> {
    schema: &'s CompiledSchema,
    diagnostics: Vec<Diagnostic>,
    limit: usize,
}

impl<'s> Validation<'s> {
    fn report(&mut self, path: &str, message: String) {
        if self.diagnostics.len() < self.limit {
            self.diagnostics.push(Diagnostic::new(path, message));
        }
    }

    fn full(&self) -> bool {
        self.diagnostics.len() >= self.limit
    }

    fn element(&mut self, decl: &'s ElementDecl, el: &XmlElement, path: &str) {
        let schema = self.schema;
        if self.full() {
            return;
        }
        if decl.is_abstract {
            self.report(path, format!("element <{}> is abstract", el.display_name()));
            return;
        }

        let mut type_ref = decl.type_ref;
        if let Some(raw) = el.attribute_ns(XSI_NS, "type") {
            match self.instance_type(el, raw) {
                Ok(t) => type_ref = t,
                Err(message) => {
                    self.report(path, message);
                    return;
                }
            }
        }

        if let Some(nil) = el.attribute_ns(XSI_NS, "nil") {
            if matches!(nil.trim(), "true" | "1") {
                if !decl.nillable {
                    self.report(path, format!("element <{}> is not nillable", el.display_name()));
                } else if el.elements().next().is_some() || el.has_text() {
                    self.report(path, format!("element <{}> is nil but has content", el.display_name()));
                }
                if let TypeRef::Defined(id) = type_ref {
                    if let TypeDef::Complex(ct) = schema.type_def(id) {
                        self.attributes(ct, el, path);
                    }
                }
                return;
            }
        }

        match type_ref {
            TypeRef::Builtin(b) if b.is_complex() => {}
            TypeRef::Defined(id) => match schema.type_def(id) {
                TypeDef::Complex(ct) => self.complex(ct, decl, el, path),
                TypeDef::Simple(_) => self.simple_element(type_ref, decl, el, path),
            },
            TypeRef::Builtin(_) => self.simple_element(type_ref, decl, el, path),
        }
    }

    /// Resolve an `xsi:type` override.
    fn instance_type(&self, el: &XmlElement, raw: &str) -> Result<TypeRef, String> {
        let name = el.resolve_qname(raw)?;
        if name.namespace() == Some(super::XS_NS) {
            return BuiltinType::from_name(&name.local_name)
                .map(TypeRef::Builtin)
                .ok_or_else(|| format!("xsi:type '{}' is not a known type", raw));
        }
        let id = *self
            .schema
            .global_types
            .get(&name)
            .ok_or_else(|| format!("xsi:type '{}' is not a known type", raw))?;
        if let TypeDef::Complex(ct) = self.schema.type_def(id) {
            if ct.is_abstract {
                return Err(format!("xsi:type '{}' is abstract", raw));
            }
        }
        Ok(TypeRef::Defined(id))
    }

    fn simple_element(&mut self, type_ref: TypeRef, decl: &ElementDecl, el: &XmlElement, path: &str) {
        if let Some(child) = el.elements().next() {
            self.report(
                path,
                format!(
                    "unexpected element <{}>; type {} allows text only",
                    child.display_name(),
                    self.schema.type_label(type_ref)
                ),
            );
            return;
        }
        for attr in el.attributes.iter().filter(|a| a.name.namespace() != Some(XSI_NS)) {
            self.report(path, format!("attribute '{}' is not allowed", attr.name));
        }
        let text = el.text();
        self.element_value(type_ref, decl, &text, path);
    }

    /// Check element text, applying the declaration's default and fixed values.
    fn element_value(&mut self, type_ref: TypeRef, decl: &ElementDecl, text: &str, path: &str) {
        let value = match (&decl.fixed, &decl.default) {
            (Some(fixed), _) if text.is_empty() => fixed.as_str(),
            (_, Some(default)) if text.is_empty() => default.as_str(),
            _ => text,
        };
        if let Some(fixed) = &decl.fixed {
            if value.trim() != fixed.trim() {
                self.report(
                    path,
                    format!("value '{}' does not match the fixed value '{}'", value.trim(), fixed),
                );
                return;
            }
        }
        if let Err(message) = self.simple_value(type_ref, value) {
            self.report(path, message);
        }
    }

    fn complex(&mut self, ct: &'s ComplexType, decl: &ElementDecl, el: &XmlElement, path: &str) {
        if ct.is_abstract {
            self.report(
                path,
                format!("type of <{}> is abstract; an xsi:type is required", el.display_name()),
            );
            return;
        }
        self.attributes(ct, el, path);

        match &ct.content {
            Content::Empty => {
                if let Some(child) = el.elements().next() {
                    self.report(
                        path,
                        format!(
                            "unexpected element <{}>; element <{}> must be empty",
                            child.display_name(),
                            el.display_name()
                        ),
                    );
                } else if el.has_text() {
                    self.report(path, format!("element <{}> must be empty", el.display_name()));
                }
            }
            Content::Simple(value_type) => {
                if let Some(child) = el.elements().next() {
                    self.report(
                        path,
                        format!(
                            "unexpected element <{}>; type {} allows text only",
                            child.display_name(),
                            self.schema.type_label(*value_type)
                        ),
                    );
                } else {
                    self.element_value(*value_type, decl, &el.text(), path);
                }
            }
            Content::Elements(particle) => {
                if !ct.mixed && el.has_text() {
                    self.report(
                        path,
                        format!("text content is not allowed in element <{}>", el.display_name()),
                    );
                }
                self.children(particle, el, path);
            }
        }
    }

    fn attributes(&mut self, ct: &ComplexType, el: &XmlElement, path: &str) {
        for attr in &el.attributes {
            if attr.name.namespace() == Some(XSI_NS) {
                continue;
            }
            let attr_path = format!("{}/@{}", path, attr.name.local_name);
            match ct.attributes.iter().find(|u| u.name == attr.name) {
                Some(usage) => self.attribute_value(usage, &attr.value, &attr_path),
                None => {
                    let allowed = ct
                        .any_attribute
                        .as_ref()
                        .is_some_and(|w| w.allows(attr.name.namespace()));
                    if !allowed {
                        self.report(&attr_path, format!("attribute '{}' is not allowed", attr.name));
                    }
                }
            }
        }

        for usage in ct.attributes.iter().filter(|u| u.required) {
            let present = el.attributes.iter().any(|a| a.name == usage.name);
            if !present {
                self.report(
                    path,
                    format!("missing required attribute '{}'", usage.name),
                );
            }
        }
    }

    fn attribute_value(&mut self, usage: &AttributeUse, value: &str, path: &str) {
        if let Some(fixed) = &usage.fixed {
            if value.trim() != fixed.trim() {
                self.report(
                    path,
                    format!("value '{}' does not match the fixed value '{}'", value.trim(), fixed),
                );
                return;
            }
        }
        if let Err(message) = self.simple_value(usage.type_ref, value) {
            self.report(path, message);
        }
    }

    fn children(&mut self, particle: &'s Particle, el: &XmlElement, path: &str) {
        let children: Vec<&XmlElement> = el.elements().collect();
        let mut matcher = Matcher {
            schema: self.schema,
            children: &children,
            assigned: Vec::with_capacity(children.len()),
            furthest: 0,
            expected: BTreeSet::new(),
            steps: 0,
            max_steps: BASE_STEPS
                .saturating_add((children.len() + 1).saturating_mul(particle.size()).saturating_mul(STEPS_PER_POSITION)),
            exhausted: false,
        };

        let total = children.len();
        let matched = matcher.particle(particle, 0, &mut |m: &mut Matcher<'_, '_>, pos: usize| {
            if pos == total {
                return true;
            }
            m.reached(pos, None);
            false
        });

        if !matched {
            if matcher.exhausted {
                self.report(
                    path,
                    format!("content of <{}> is too complex to validate", el.display_name()),
                );
                return;
            }
            let expected = matcher.expected_list();
            match children.get(matcher.furthest) {
                Some(child) => {
                    let child_path = format!("{}/{}", path, child.local_name());
                    let message = match expected {
                        Some(list) => format!("unexpected element <{}>; expected {}", child.display_name(), list),
                        None => format!("unexpected element <{}>; no more elements are allowed", child.display_name()),
                    };
                    self.report(&child_path, message);
                }
                None => {
                    let message = match expected {
                        Some(list) => format!("missing element; expected {}", list),
                        None => format!("content of <{}> is incomplete", el.display_name()),
                    };
                    self.report(path, message);
                }
            }
            return;
        }

        let schema = self.schema;
        let assigned = matcher.assigned;
        for (child, target) in children.iter().zip(assigned) {
            if self.full() {
                return;
            }
            let child_path = format!("{}/{}", path, child.local_name());
            match target {
                Target::Element(id) => self.element(schema.element(id), child, &child_path),
                Target::Wildcard(wildcard) => self.wildcard_child(wildcard, child, &child_path),
            }
        }
    }

    fn wildcard_child(&mut self, wildcard: &Wildcard, child: &XmlElement, path: &str) {
        if wildcard.process == ProcessContents::Skip {
            return;
        }
        let schema = self.schema;
        match schema.global_elements.get(&child.name) {
            Some(&id) => self.element(schema.element(id), child, path),
            None if wildcard.process == ProcessContents::Strict => {
                self.report(path, format!("no global element declaration for {}", child.name))
            }
            None => {}
        }
    }

    // --- simple values ---

    fn simple_value(&self, type_ref: TypeRef, raw: &str) -> Result<(), String> {
        match type_ref {
            TypeRef::Builtin(b) => {
                if b.is_complex() {
                    return Ok(());
                }
                let value = b.whitespace().apply(raw);
                b.check(&value).map_err(|phrase| format!("value '{}' is {}", value, phrase))
            }
            TypeRef::Defined(id) => match self.schema.type_def(id) {
                TypeDef::Complex(_) => Err(format!(
                    "type {} cannot be used for a text value",
                    self.schema.type_label(type_ref)
                )),
                TypeDef::Simple(st) => match &st.variety {
                    SimpleVariety::Restriction { base, facets } => {
                        self.simple_value(*base, raw)?;
                        let primitive = self.primitive(*base);
                        let whitespace = primitive.map_or(WhiteSpace::Collapse, |b| b.whitespace());
                        let value = whitespace.apply(raw);
                        check_facets(facets, primitive, &value)
                    }
                    SimpleVariety::List { item } => {
                        let value = WhiteSpace::Collapse.apply(raw);
                        value
                            .split(' ')
                            .filter(|token| !token.is_empty())
                            .try_for_each(|token| self.simple_value(*item, token))
                    }
                    SimpleVariety::Union { members } => {
                        if members.iter().any(|m| self.simple_value(*m, raw).is_ok()) {
                            Ok(())
                        } else {
                            Err(format!(
                                "value '{}' does not match any member of {}",
                                raw.trim(),
                                self.schema.type_label(type_ref)
                            ))
                        }
                    }
                },
            },
        }
    }

    /// Built-in type at the root of a restriction chain; `None` for lists
    /// and unions.
    fn primitive(&self, mut type_ref: TypeRef) -> Option<BuiltinType> {
        loop {
            match type_ref {
                TypeRef::Builtin(b) if b.is_list() => return None,
                TypeRef::Builtin(b) => return Some(b),
                TypeRef::Defined(id) => match self.schema.type_def(id) {
                    TypeDef::Simple(st) => match &st.variety {
                        SimpleVariety::Restriction { base, .. } => type_ref = *base,
                        _ => return None,
                    },
                    TypeDef::Complex(_) => return None,
                },
            }
        }
    }
}

fn check_facets(facets: &Facets, primitive: Option<BuiltinType>, value: &str) -> Result<(), String> {
    if !facets.enumeration.is_empty() {
        let found = facets.enumeration.iter().any(|allowed| {
            let allowed = primitive.map_or(WhiteSpace::Collapse, |b| b.whitespace()).apply(allowed);
            match primitive.and_then(|b| b.compare(value, &allowed)) {
                Some(ordering) => ordering == Ordering::Equal,
                None => allowed == value,
            }
        });
        if !found {
            return Err(format!(
                "value '{}' is not one of the allowed values: {}",
                value,
                facets.enumeration.join(", ")
            ));
        }
    }

    if !facets.patterns.is_empty() && !facets.patterns.iter().any(|p| p.regex.is_match(value)) {
        let sources: Vec<&str> = facets.patterns.iter().map(|p| p.source.as_str()).collect();
        return Err(format!("value '{}' does not match pattern '{}'", value, sources.join("|")));
    }

    let length = match primitive {
        Some(b) => b.value_length(value),
        None => value.split(' ').filter(|s| !s.is_empty()).count(),
    };
    if let Some(expected) = facets.length {
        if length != expected {
            return Err(format!("value '{}' has length {}, expected {}", value, length, expected));
        }
    }
    if let Some(min) = facets.min_length {
        if length < min {
            return Err(format!("value '{}' is shorter than the minimum length {}", value, min));
        }
    }
    if let Some(max) = facets.max_length {
        if length > max {
            return Err(format!("value '{}' is longer than the maximum length {}", value, max));
        }
    }

    if let Some(b) = primitive {
        let bounds = [
            (&facets.min_inclusive, "less than the minimum", Ordering::Less, true),
            (&facets.min_exclusive, "not greater than", Ordering::Greater, false),
            (&facets.max_inclusive, "greater than the maximum", Ordering::Greater, true),
            (&facets.max_exclusive, "not less than", Ordering::Less, false),
        ];
        for (bound, phrase, ordering, inclusive) in bounds {
            let Some(bound) = bound else { continue };
            let Some(actual) = b.compare(value, bound) else { continue };
            let violated = if inclusive {
                actual == ordering
            } else {
                actual != ordering
            };
            if violated {
                return Err(format!("value '{}' is {} {}", value, phrase, bound));
            }
        }

        if facets.total_digits.is_some() || facets.fraction_digits.is_some() {
            let (total, fraction) = digit_counts(value);
            if let Some(max) = facets.total_digits {
                if total > max {
                    return Err(format!("value '{}' has more than {} digits", value, max));
                }
            }
            if let Some(max) = facets.fraction_digits {
                if fraction > max {
                    return Err(format!("value '{}' has more than {} fraction digits", value, max));
                }
            }
        }
    }

    Ok(())
}

/// Significant total and fraction digits of a decimal literal.
fn digit_counts(value: &str) -> (usize, usize) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let integer = integer.trim_start_matches('0');
    let fraction = fraction.trim_end_matches('0');
    let total = (integer.len() + fraction.len()).max(1);
    (total, fraction.len())
}

// --- content model matching ---

#[derive(Clone, Copy)]
enum Target<'s> {
    Element(ElementId),
    Wildcard(&'s Wildcard),
}

type Continuation<'k, 's, 'c> = dyn FnMut(&mut Matcher<'s, 'c>, usize) -> bool + 'k;

struct Matcher<'s, 'c> {
    schema: &'s CompiledSchema,
    children: &'c [&'c XmlElement],
    /// Target of each matched child, indexed by child position
    assigned: Vec<Target<'s>>,
    /// Furthest child position any attempt reached, and what was expected there
    furthest: usize,
    expected: BTreeSet<String>,
    steps: usize,
    max_steps: usize,
    exhausted: bool,
}

impl<'s, 'c> Matcher<'s, 'c> {
    fn reached(&mut self, pos: usize, expected: Option<String>) {
        if pos > self.furthest {
            self.furthest = pos;
            self.expected.clear();
        }
        if pos == self.furthest {
            if let Some(label) = expected {
                self.expected.insert(label);
            }
        }
    }

    fn expected_list(&self) -> Option<String> {
        let labels: Vec<&str> = self.expected.iter().map(String::as_str).collect();
        match labels.as_slice() {
            [] => None,
            [only] => Some(only.to_string()),
            many => Some(format!("one of: {}", many.join(", "))),
        }
    }

    fn tick(&mut self) -> bool {
        self.steps += 1;
        if self.steps > self.max_steps {
            self.exhausted = true;
        }
        !self.exhausted
    }

    /// Target for the child at `pos` if it matches a single-element term.
    fn single(&mut self, term: &'s Term, pos: usize) -> Option<Target<'s>> {
        let schema = self.schema;
        let children = self.children;
        let child = children.get(pos);
        match term {
            Term::Element(id) => {
                let decl = schema.element(*id);
                self.reached(pos, Some(format!("<{}>", decl.name.local_name)));
                let child = child?;
                std::iter::once(*id)
                    .chain(decl.substitutes.iter().copied())
                    .find(|candidate| {
                        let d = schema.element(*candidate);
                        !d.is_abstract && d.name == child.name
                    })
                    .map(Target::Element)
            }
            Term::Any(wildcard) => {
                self.reached(pos, Some("any element".to_string()));
                let child = child?;
                wildcard.allows(child.namespace()).then_some(Target::Wildcard(wildcard))
            }
            _ => None,
        }
    }

    fn particle(&mut self, particle: &'s Particle, pos: usize, k: &mut Continuation<'_, 's, 'c>) -> bool {
        if !self.tick() {
            return false;
        }
        match &particle.term {
            Term::Element(_) | Term::Any(_) => self.repeat_single(particle, pos, k),
            _ => self.repeat_group(particle, pos, k),
        }
    }

    /// Greedy match of a repeated single-element term, backing off one
    /// occurrence at a time.
    fn repeat_single(&mut self, particle: &'s Particle, pos: usize, k: &mut Continuation<'_, 's, 'c>) -> bool {
        let mut targets = Vec::new();
        while particle.max_occurs.map_or(true, |max| (targets.len() as u32) < max) {
            match self.single(&particle.term, pos + targets.len()) {
                Some(target) => targets.push(target),
                None => break,
            }
        }

        let min = particle.min_occurs as usize;
        let mut count = targets.len();
        loop {
            if count < min {
                return false;
            }
            self.assigned.truncate(pos);
            self.assigned.extend_from_slice(&targets[..count]);
            if k(self, pos + count) {
                return true;
            }
            if self.exhausted || count == 0 {
                return false;
            }
            count -= 1;
        }
    }

    /// Repeated model group. Each occurrence takes the first match that
    /// consumes at least one element; the continuation is then tried after
    /// every occurrence, most occurrences first.
    fn repeat_group(&mut self, particle: &'s Particle, pos: usize, k: &mut Continuation<'_, 's, 'c>) -> bool {
        let mut boundaries = vec![pos];
        while particle.max_occurs.map_or(true, |max| boundaries.len() - 1 < max as usize) {
            let start = boundaries[boundaries.len() - 1];
            let mut end = None;
            let matched = self.group(&particle.term, start, &mut |_: &mut Matcher<'s, 'c>, next: usize| {
                if next > start {
                    end = Some(next);
                    true
                } else {
                    false
                }
            });
            if self.exhausted {
                return false;
            }
            match end {
                Some(next) if matched => boundaries.push(next),
                _ => break,
            }
        }

        // Missing occurrences can be filled with empty ones.
        let emptiable = particle.term.is_emptiable();
        let min = particle.min_occurs as usize;
        let mut count = boundaries.len() - 1;
        loop {
            if count < min && !emptiable {
                return false;
            }
            if k(self, boundaries[count]) {
                return true;
            }
            if self.exhausted || count == 0 {
                return false;
            }
            count -= 1;
        }
    }

    fn group(&mut self, term: &'s Term, pos: usize, k: &mut Continuation<'_, 's, 'c>) -> bool {
        match term {
            Term::Sequence(items) => self.sequence(items, pos, k),
            Term::Choice(alternatives) => {
                for alternative in alternatives {
                    if self.particle(alternative, pos, k) {
                        return true;
                    }
                    if self.exhausted {
                        return false;
                    }
                }
                false
            }
            Term::All(items) => {
                let mut used = vec![false; items.len()];
                self.all(items, &mut used, pos, k)
            }
            Term::Element(_) | Term::Any(_) => match self.single(term, pos) {
                Some(target) => {
                    self.assigned.truncate(pos);
                    self.assigned.push(target);
                    k(self, pos + 1)
                }
                None => false,
            },
        }
    }

    fn sequence(&mut self, items: &'s [Particle], pos: usize, k: &mut Continuation<'_, 's, 'c>) -> bool {
        match items.split_first() {
            None => k(self, pos),
            Some((first, rest)) => self.particle(first, pos, &mut |m: &mut Matcher<'s, 'c>, next: usize| {
                m.sequence(rest, next, &mut *k)
            }),
        }
    }

    fn all(&mut self, items: &'s [Particle], used: &mut [bool], pos: usize, k: &mut Continuation<'_, 's, 'c>) -> bool {
        if !self.tick() {
            return false;
        }
        for (index, item) in items.iter().enumerate() {
            if used[index] {
                continue;
            }
            if let Some(target) = self.single(&item.term, pos) {
                used[index] = true;
                self.assigned.truncate(pos);
                self.assigned.push(target);
                if self.all(items, used, pos + 1, k) {
                    return true;
                }
                used[index] = false;
                if self.exhausted {
                    return false;
                }
            }
        }
        let complete = items
            .iter()
            .zip(used.iter())
            .all(|(item, used)| *used || item.min_occurs == 0);
        complete && k(self, pos)
    }
}
