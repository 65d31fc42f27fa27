//! Output formatting for CLI

use intermission_core::ClassificationResult;
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON for machine consumers
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Human-readable classification summary
pub fn classification_text(title: &str, result: &ClassificationResult) -> String {
    let mut lines = vec![title.to_string()];
    let chip = if result.age_chip.is_empty() { "-" } else { result.age_chip.as_str() };
    lines.push(format!("  Age:         {chip}"));
    lines.push(format!("  Source:      {:?}", result.source));
    if result.descriptors.is_empty() {
        lines.push("  Descriptors: none".to_string());
    } else {
        lines.push("  Descriptors:".to_string());
        for descriptor in &result.descriptors {
            lines.push(format!(
                "    {:<12} {:<24} {:.2}",
                descriptor.key, descriptor.label, descriptor.score
            ));
        }
    }
    lines.join("\n")
}
