//! Remote element references and locate results.
//!
//! Elements live on the automation endpoint; the client only ever holds the
//! opaque id the endpoint handed out, together with the [`Locator`] that found
//! it. A locate operation reports one of three outcomes via [`Located`], so the
//! caller has to decide what happens when several elements share the same
//! visible text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON key carrying an element id in W3C WebDriver responses.
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// JSON key carrying an element id in legacy JSON Wire Protocol responses.
pub const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// How an element is addressed on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Exact match on the element's visible text.
    Text(String),
    /// Raw XPath query against the page source.
    XPath(String),
    /// Android UiAutomator selector expression.
    UiAutomator(String),
}

impl Locator {
    /// Locator that scrolls the first scrollable container until an element
    /// with the given visible text comes into view.
    pub fn scroll_to_text(text: &str) -> Self {
        Locator::UiAutomator(format!(
            "new UiScrollable(new UiSelector().scrollable(true).instance(0))\
             .scrollIntoView(new UiSelector().text({}))",
            java_string_literal(text)
        ))
    }

    /// The WebDriver `using` strategy name for this locator.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Text(_) | Locator::XPath(_) => "xpath",
            Locator::UiAutomator(_) => "-android uiautomator",
        }
    }

    /// The WebDriver `value` for this locator.
    pub fn query(&self) -> String {
        match self {
            Locator::Text(text) => format!("//*[@text={}]", xpath_literal(text)),
            Locator::XPath(xpath) => xpath.clone(),
            Locator::UiAutomator(selector) => selector.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Text(text) => write!(f, "text '{}'", text),
            Locator::XPath(xpath) => write!(f, "xpath {}", xpath),
            Locator::UiAutomator(selector) => write!(f, "uiautomator {}", selector),
        }
    }
}

/// Quotes `text` as an XPath 1.0 string literal.
///
/// XPath 1.0 has no escape sequences, so text containing both quote kinds is
/// assembled with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    let parts: Vec<String> = text
        .split('"')
        .map(|part| format!("\"{}\"", part))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

fn java_string_literal(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A reference to an element on the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Opaque element id assigned by the endpoint.
    pub id: String,
    /// The locator this element was found with.
    pub locator: Locator,
}

/// Outcome of locating an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// Exactly one element matched.
    Found(Element),
    /// Nothing matched within the implicit wait.
    NotFound,
    /// More than one element matched, in document order.
    Ambiguous(Vec<Element>),
}

impl Located {
    /// Classifies a list of matches returned by a find-elements call.
    pub fn from_matches(mut matches: Vec<Element>) -> Self {
        match matches.len() {
            0 => Located::NotFound,
            1 => Located::Found(matches.remove(0)),
            _ => Located::Ambiguous(matches),
        }
    }
}

/// What to do when a locator matches more than one element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Take the first match in document order.
    #[default]
    FirstMatch,
    /// Treat the match as a failure.
    Reject,
}

impl AmbiguityPolicy {
    /// Resolves a [`Located`] into a single element.
    ///
    /// Returns the unresolved outcome back when no element can be chosen.
    pub fn resolve(self, located: Located) -> Result<Element, Located> {
        match (located, self) {
            (Located::Found(element), _) => Ok(element),
            (Located::Ambiguous(mut matches), AmbiguityPolicy::FirstMatch) => Ok(matches.remove(0)),
            (other, _) => Err(other),
        }
    }
}
