use serde_json::Value;
use std::fmt::Write;

use crate::analysis::AnalysisState;
use crate::models::{AnalysisResult, Recommendations, SyndromeType};

const UNSPECIFIED: &str = "unspecified";

/// Plain-text rendering of an analysis result, one section per block.
/// The syndrome name is only shown for syndromic results.
pub fn render_result(result: &AnalysisResult) -> String {
    let mut out = String::new();

    match result.syndrome_type {
        SyndromeType::Syndromic => {
            let _ = writeln!(out, "Syndrome type: syndromic");
            let name = result
                .syndrome_name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(UNSPECIFIED);
            let _ = writeln!(out, "Syndrome: {}", name);
        }
        SyndromeType::NonSyndromic => {
            let _ = writeln!(out, "Syndrome type: non-syndromic");
        }
    }
    let _ = writeln!(out, "Cleft type: {}", result.cleft_type);
    let _ = writeln!(out, "Severity: {}", result.severity);

    write_section(&mut out, "Treatment recommendations", Some(&result.treatment_recommendations));
    write_section(
        &mut out,
        "Specialist recommendations",
        result.specialist_recommendations.as_ref(),
    );
    write_section(&mut out, "Follow-up plan", result.follow_up_plan.as_ref());

    out
}

fn write_section(out: &mut String, title: &str, entries: Option<&Recommendations>) {
    let Some(entries) = entries.filter(|e| !e.is_empty()) else {
        return;
    };
    let _ = writeln!(out, "\n{}:", title);
    for (key, value) in entries {
        let _ = writeln!(out, "  - {}: {}", key, flatten(value));
    }
}

fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(flatten).collect::<Vec<_>>().join("; "),
        Value::Null => UNSPECIFIED.to_string(),
        other => other.to_string(),
    }
}

/// One-line status for the analysis panel.
pub fn render_state(state: &AnalysisState) -> String {
    match state {
        AnalysisState::Idle => String::new(),
        AnalysisState::Submitting => "Analyzing...".to_string(),
        AnalysisState::Succeeded(result) => render_result(result),
        AnalysisState::Failed(message) => message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(value: serde_json::Value) -> AnalysisResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_non_syndromic_result_hides_syndrome_name() {
        let text = render_result(&result(json!({
            "syndrome_type": "non_syndromic",
            "syndrome_name": "Van der Woude",
            "cleft_type": "cleft palate",
            "severity": "moderate",
            "treatment_recommendations": {"surgery": "palatoplasty", "steps": ["feeding plate", "speech therapy"]}
        })));

        assert!(!text.contains("Van der Woude"));
        assert!(text.contains("Cleft type: cleft palate"));
        assert!(text.contains("  - steps: feeding plate; speech therapy"));
        assert!(!text.contains("Follow-up plan"));
    }

    #[test]
    fn test_syndromic_result_without_name() {
        let text = render_result(&result(json!({
            "syndrome_type": "syndromic",
            "cleft_type": "bilateral cleft lip and palate",
            "severity": "severe",
            "treatment_recommendations": {},
            "specialist_recommendations": {"genetics": "karyotype"}
        })));

        assert!(text.contains("Syndrome: unspecified"));
        assert!(text.contains("Specialist recommendations:\n  - genetics: karyotype"));
        assert!(!text.contains("Treatment recommendations"));
    }

    #[test]
    fn test_render_state() {
        assert_eq!(render_state(&AnalysisState::Idle), "");
        assert_eq!(render_state(&AnalysisState::Failed("x".into())), "x");
    }
}
