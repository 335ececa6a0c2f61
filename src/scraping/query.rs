//! Declarative element queries.
//!
//! Workflow and scanner code describe *what* element they want through
//! [`Query`] values. Only the automation adapter knows how a query becomes a
//! concrete selector dialect (see `scraping::xpath`), so portal logic never
//! concatenates selector strings.

/// A single condition an element must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `name` attribute equals `value` exactly.
    AttrEquals(String, String),
    /// `name` attribute contains `value` as a substring.
    AttrContains(String, String),
    /// `class` attribute contains the given token.
    HasClass(String),
    /// `class` attribute does not contain the given token.
    LacksClass(String),
    /// Own text contains the given fragment.
    TextContains(String),
    /// Whitespace-normalised text equals the given value.
    TextEquals(String),
    /// Element has a descendant matching the nested query.
    Has(Box<Query>),
}

/// Declarative element selection.
///
/// Three families, matching how the portal is addressed:
/// * by attribute / text: [`Query::Element`] with predicates,
/// * by structural relation: [`Query::Descendant`], [`Query::Child`],
///   [`Query::Following`],
/// * alternatives: [`Query::AnyOf`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Element {
        tag: Option<String>,
        predicates: Vec<Predicate>,
    },
    /// `target` anywhere below `ancestor`.
    Descendant {
        ancestor: Box<Query>,
        target: Box<Query>,
    },
    /// `target` as a direct child of `parent`.
    Child { parent: Box<Query>, target: Box<Query> },
    /// First `target` after the first `anchor` in document order.
    Following { anchor: Box<Query>, target: Box<Query> },
    /// Union of alternatives, in document order.
    AnyOf(Vec<Query>),
}

impl Query {
    /// Any element with the given tag.
    pub fn tag(tag: impl Into<String>) -> Self {
        Query::Element {
            tag: Some(tag.into()),
            predicates: Vec::new(),
        }
    }

    /// Any element regardless of tag.
    pub fn any() -> Self {
        Query::Element {
            tag: None,
            predicates: Vec::new(),
        }
    }

    /// Adds a predicate. Only meaningful on [`Query::Element`]; on structural
    /// variants the predicate is pushed onto the innermost target.
    pub fn with(mut self, predicate: Predicate) -> Self {
        match &mut self {
            Query::Element { predicates, .. } => predicates.push(predicate),
            Query::Descendant { target, .. }
            | Query::Child { target, .. }
            | Query::Following { target, .. } => {
                let inner = std::mem::replace(target.as_mut(), Query::any());
                **target = inner.with(predicate);
            }
            Query::AnyOf(alternatives) => {
                for alt in alternatives.iter_mut() {
                    let inner = std::mem::replace(alt, Query::any());
                    *alt = inner.with(predicate.clone());
                }
            }
        }
        self
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.with(Predicate::AttrEquals(name.to_string(), value.to_string()))
    }

    pub fn attr_contains(self, name: &str, value: &str) -> Self {
        self.with(Predicate::AttrContains(name.to_string(), value.to_string()))
    }

    pub fn class(self, class: &str) -> Self {
        self.with(Predicate::HasClass(class.to_string()))
    }

    pub fn without_class(self, class: &str) -> Self {
        self.with(Predicate::LacksClass(class.to_string()))
    }

    pub fn text_contains(self, text: &str) -> Self {
        self.with(Predicate::TextContains(text.to_string()))
    }

    pub fn text_equals(self, text: &str) -> Self {
        self.with(Predicate::TextEquals(text.to_string()))
    }

    pub fn containing(self, inner: Query) -> Self {
        self.with(Predicate::Has(Box::new(inner)))
    }

    /// `target` nested anywhere inside `self`.
    pub fn descendant(self, target: Query) -> Self {
        Query::Descendant {
            ancestor: Box::new(self),
            target: Box::new(target),
        }
    }

    /// `target` as a direct child of `self`.
    pub fn child(self, target: Query) -> Self {
        Query::Child {
            parent: Box::new(self),
            target: Box::new(target),
        }
    }

    /// First `target` that follows `self` in document order.
    pub fn followed_by(self, target: Query) -> Self {
        Query::Following {
            anchor: Box::new(self),
            target: Box::new(target),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&super::xpath::render(self))
    }
}
