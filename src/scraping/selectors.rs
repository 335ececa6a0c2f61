//! Element queries for the appointment portal.
//!
//! The portal is an Angular Material application; queries target the
//! component tags and stable CSS hooks rather than visible copy wherever
//! possible, because copy changes with the UI language.

use super::query::Query;

/// Placeholder option rendered at the top of every portal dropdown.
pub const PLACEHOLDER_OPTION: &str = "-";

// ── Login ─────────────────────────────────────────────────────────────────────

pub fn login_submit() -> Query {
    Query::tag("button").class("btn--submit")
}

pub fn cookie_dismiss() -> Query {
    Query::tag("a")
        .attr_contains("aria-label", "cookie")
        .attr_contains("aria-label", "dismiss")
}

pub fn email_input() -> Query {
    Query::tag("input").attr("formcontrolname", "email")
}

pub fn password_input() -> Query {
    Query::tag("input").attr("formcontrolname", "password")
}

pub fn login_error() -> Query {
    Query::tag("mat-error").text_contains("Incorrect email")
}

/// Link to the case chooser, only rendered for signed-in users.
pub fn authenticated_marker() -> Query {
    Query::tag("a")
        .attr("routerlink", "/home/cases-choose")
        .attr("class", "btn")
}

// ── Case page ─────────────────────────────────────────────────────────────────

pub fn location_select() -> Query {
    Query::tag("mat-select").attr("name", "location")
}

pub fn queue_select() -> Query {
    Query::tag("mat-select").attr("name", "queueName")
}

/// The appointment section, recognised structurally as "a location selector
/// nested in an accordion-like container" so the heading copy does not matter.
pub fn appointment_section() -> Query {
    Query::tag("div")
        .class("accordion")
        .descendant(location_select())
}

pub fn any_button() -> Query {
    Query::tag("button")
}

/// Candidate section headings, checked against the localized vocabulary.
pub fn section_headings() -> Query {
    Query::AnyOf(vec![
        Query::tag("h2"),
        Query::tag("h3"),
        Query::tag("h4"),
        Query::any().class("accordion__title"),
    ])
}

/// Attribute set on the heading recognised as the appointment section, so
/// the expand control can be located relative to it without round-tripping
/// rendered text through XPath.
pub const HEADING_ANCHOR_ATTR: &str = "data-watch-anchor";

/// Script run on the recognised heading to tag it with [`HEADING_ANCHOR_ATTR`].
pub const MARK_HEADING_SCRIPT: &str = "this.setAttribute('data-watch-anchor', 'appointment'); return null;";

/// The first accordion expand control after the tagged heading.
pub fn anchored_accordion_button() -> Query {
    Query::any()
        .attr(HEADING_ANCHOR_ATTR, "appointment")
        .followed_by(Query::tag("button").class("btn--accordion"))
}

// ── Dropdowns ─────────────────────────────────────────────────────────────────

/// Labels of the options of whichever dropdown is currently open.
pub fn option_labels() -> Query {
    Query::tag("mat-option").child(Query::tag("span").attr("class", "mat-option-text"))
}

pub fn option_with_label(label: &str) -> Query {
    Query::tag("mat-option").child(
        Query::tag("span")
            .attr("class", "mat-option-text")
            .text_equals(label),
    )
}

/// Backdrop behind an open dropdown; clicking it closes the menu.
pub fn overlay_backdrop() -> Query {
    Query::tag("div").class("cdk-overlay-backdrop")
}

pub fn busy_indicator() -> Query {
    Query::tag("mat-spinner").attr("role", "progressbar")
}

// ── Calendar ──────────────────────────────────────────────────────────────────

pub fn calendar() -> Query {
    Query::tag("mat-calendar").class("reservation-calander")
}

pub fn enabled_day_cells() -> Query {
    calendar().descendant(
        Query::tag("td")
            .attr("role", "gridcell")
            .without_class("disabled"),
    )
}

pub fn month_label() -> Query {
    Query::tag("button")
        .class("mat-calendar-period-button")
        .child(Query::tag("span"))
}

pub fn next_month() -> Query {
    Query::tag("button").class("mat-calendar-next-button")
}

pub fn previous_month() -> Query {
    Query::tag("button").class("mat-calendar-previous-button")
}

pub fn slot_container() -> Query {
    Query::tag("div")
        .attr("class", "reservation__hours")
        .descendant(Query::tag("div").attr("class", "tiles tiles--hours"))
}

pub fn slot_tiles() -> Query {
    slot_container().descendant(
        Query::tag("div")
            .attr("class", "row")
            .descendant(Query::any().class("tile")),
    )
}

// ── Challenge ─────────────────────────────────────────────────────────────────

/// Buttons rendered inside a bot-manager interstitial container; the label is
/// checked against the localized "proceed" vocabulary.
pub fn challenge_proceed_controls() -> Query {
    Query::any()
        .attr_contains("id", "sec-")
        .descendant(Query::AnyOf(vec![
            Query::tag("button"),
            Query::tag("a").attr("role", "button"),
            Query::tag("input").attr("type", "submit"),
        ]))
}

pub fn vendor_challenge_frame() -> Query {
    Query::tag("iframe").attr_contains("src", "akamai")
}

/// Structural markers of the vendor's challenge overlay, most specific first.
pub fn vendor_challenge_overlays() -> Vec<Query> {
    vec![
        Query::any().attr("id", "sec-cpt-if"),
        Query::any().attr("id", "sec-overlay"),
        Query::tag("div").attr_contains("id", "sec-container"),
        Query::tag("div").class("behavioral-content"),
    ]
}

pub fn dialog_containers() -> Query {
    Query::AnyOf(vec![
        Query::tag("mat-dialog-container"),
        Query::any().attr("role", "dialog"),
        Query::tag("div").class("modal"),
    ])
}
