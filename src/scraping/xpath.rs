//! XPath rendering for [`Query`] values.
//!
//! This is the only place that knows the concrete selector dialect. The
//! chromium adapter feeds the rendered strings to `Page::find_xpaths`.

use super::query::{Predicate, Query};

/// Render an absolute XPath expression (always starts with `//` or `(`).
pub fn render(query: &Query) -> String {
    match query {
        Query::Element { .. } => format!("//{}", step(query)),
        Query::Descendant { ancestor, target } => {
            format!("{}//{}", render(ancestor), relative(target))
        }
        Query::Child { parent, target } => format!("{}/{}", render(parent), relative(target)),
        Query::Following { anchor, target } => format!(
            "(({})[1]/following::{})[1]",
            render(anchor),
            relative(target)
        ),
        Query::AnyOf(alternatives) => {
            let parts: Vec<String> = alternatives.iter().map(render).collect();
            format!("({})", parts.join(" | "))
        }
    }
}

/// Render a location step usable after `/`, `//` or an axis.
fn relative(query: &Query) -> String {
    match query {
        Query::Element { .. } => step(query),
        Query::Descendant { ancestor, target } => {
            format!("{}//{}", relative(ancestor), relative(target))
        }
        Query::Child { parent, target } => format!("{}/{}", relative(parent), relative(target)),
        Query::AnyOf(alternatives) if alternatives.iter().all(is_element) => {
            let tests: Vec<String> = alternatives
                .iter()
                .map(|alt| format!("({})", self_test(alt)))
                .collect();
            format!("*[{}]", tests.join(" or "))
        }
        // Structural alternatives and nested "following" cannot be expressed
        // as a single relative step; fall back to the absolute form.
        Query::AnyOf(_) | Query::Following { .. } => render(query).trim_start_matches('/').to_string(),
    }
}

fn is_element(query: &Query) -> bool {
    matches!(query, Query::Element { .. })
}

fn step(query: &Query) -> String {
    let Query::Element { tag, predicates } = query else {
        return relative(query);
    };
    let name = tag.as_deref().unwrap_or("*");
    if predicates.is_empty() {
        return name.to_string();
    }
    let conditions: Vec<String> = predicates.iter().map(predicate).collect();
    format!("{}[{}]", name, conditions.join(" and "))
}

/// Boolean test equivalent to `step`, evaluated against `self::`.
fn self_test(query: &Query) -> String {
    let Query::Element { tag, predicates } = query else {
        return "false()".to_string();
    };
    let mut parts = Vec::with_capacity(predicates.len() + 1);
    if let Some(tag) = tag {
        parts.push(format!("self::{}", tag));
    }
    parts.extend(predicates.iter().map(predicate));
    if parts.is_empty() {
        "true()".to_string()
    } else {
        parts.join(" and ")
    }
}

fn predicate(p: &Predicate) -> String {
    match p {
        Predicate::AttrEquals(name, value) => format!("@{}={}", name, literal(value)),
        Predicate::AttrContains(name, value) => format!("contains(@{},{})", name, literal(value)),
        Predicate::HasClass(class) => format!("contains(@class,{})", literal(class)),
        Predicate::LacksClass(class) => format!("not(contains(@class,{}))", literal(class)),
        Predicate::TextContains(text) => format!("contains(normalize-space(.),{})", literal(text)),
        Predicate::TextEquals(text) => format!("normalize-space(.)={}", literal(text)),
        Predicate::Has(inner) => format!(".//{}", relative(inner)),
    }
}

/// Quote a string as an XPath 1.0 literal. XPath has no escape sequences, so
/// values holding both quote kinds are split through `concat()`.
pub fn literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    let pieces: Vec<String> = value
        .split('"')
        .map(|piece| format!("\"{}\"", piece))
        .collect();
    format!("concat({})", pieces.join(", '\"', "))
}
