use std::fmt;

use regex::Regex;

/// An opaque server-issued view token.
///
/// The server embeds one of these in every rendered page and expects it to be
/// echoed back on the next state-changing request of the same session. The
/// value is never interpreted, only carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState(String);

impl ViewState {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strategy for pulling a [`ViewState`] out of a response body.
///
/// The matching rule varies per target application, so the contract is kept
/// independent of the concrete technique: input body, optional token out,
/// no side effects, no panics on malformed input.
pub trait TokenExtractor: Send + Sync {
    fn extract(&self, body: &str) -> Option<ViewState>;
}

/// Extractor for the common `field-name … value="…"` embedding convention:
/// an HTML/XML attribute closing the field-name marker, any number of other
/// attributes, then a `value` attribute carrying the token.
///
/// The default marker is the JSF `javax.faces.ViewState` hidden field.
#[derive(Debug, Clone)]
pub struct FieldValueExtractor {
    pattern: Regex,
}

/// Field name used by JSF/PrimeFaces applications for the view token.
pub const FACES_VIEW_STATE: &str = "javax.faces.ViewState";

impl FieldValueExtractor {
    /// Build an extractor for `field`. The marker is matched literally.
    pub fn new(field: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r#"{}"[^>]*value="([^"]+)""#, regex::escape(field)))?;
        Ok(Self { pattern })
    }
}

impl TokenExtractor for FieldValueExtractor {
    fn extract(&self, body: &str) -> Option<ViewState> {
        self.pattern
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| ViewState::new(m.as_str()))
    }
}
