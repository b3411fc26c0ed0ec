//! Ledger configuration.

use crate::options::DEFAULT_WEIGHT_TOLERANCE;
use serde::{Deserialize, Serialize};

/// Configuration for option validation and session export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Allowed drift of a weighted option set's sum from 1.0.
    pub weight_tolerance: f64,

    /// First line of an exported document.
    pub format_marker: String,

    /// Second line of an exported document.
    pub version_marker: String,

    /// Replacement for `'` in exported free text.
    pub apostrophe_escape: String,

    /// Prefix of every paragraph style on an XP card.
    pub card_style_prefix: String,

    /// `chrono` format of the session date on the card number line.
    pub date_format: String,
}

impl LedgerConfig {
    /// Create a config with the standard tagged-text markers.
    pub fn new() -> Self {
        Self {
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
            format_marker: "<ASCII-MAC>".to_string(),
            version_marker: "<Version:11.2>".to_string(),
            apostrophe_escape: "<0x2019>".to_string(),
            card_style_prefix: "XP Card\\:".to_string(),
            date_format: "%-m/%-d".to_string(),
        }
    }

    /// Set the weight tolerance.
    pub fn with_weight_tolerance(mut self, tolerance: f64) -> Self {
        self.weight_tolerance = tolerance;
        self
    }

    /// Set the document format marker.
    pub fn with_format_marker(mut self, marker: impl Into<String>) -> Self {
        self.format_marker = marker.into();
        self
    }

    /// Set the document version marker.
    pub fn with_version_marker(mut self, marker: impl Into<String>) -> Self {
        self.version_marker = marker.into();
        self
    }

    /// Set the apostrophe replacement.
    pub fn with_apostrophe_escape(mut self, escape: impl Into<String>) -> Self {
        self.apostrophe_escape = escape.into();
        self
    }

    /// Set the paragraph style prefix.
    pub fn with_card_style_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.card_style_prefix = prefix.into();
        self
    }

    /// Set the card date format.
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Opening tag of a card paragraph with the given style.
    pub fn paragraph_style(&self, style: &str) -> String {
        format!("<ParaStyle:{}{}>", self.card_style_prefix, style)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.weight_tolerance, 1e-6);
        assert_eq!(config.format_marker, "<ASCII-MAC>");
        assert_eq!(
            config.paragraph_style("Body"),
            "<ParaStyle:XP Card\\:Body>"
        );
    }

    #[test]
    fn test_builder() {
        let config = LedgerConfig::new()
            .with_version_marker("<Version:16.0>")
            .with_weight_tolerance(0.01);
        assert_eq!(config.version_marker, "<Version:16.0>");
        assert_eq!(config.weight_tolerance, 0.01);
    }
}
