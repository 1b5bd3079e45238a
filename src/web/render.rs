//! HTML rendering for the screening form and its results

use crate::importance::{ImportanceReport, WARNING_MESSAGE};
use crate::types::patient::{FieldGroup, FieldKind, FieldSpec, PATIENT_FIELDS};
use crate::types::prediction::{PredictionResult, Threshold, DISCLAIMER};
use std::collections::HashMap;

/// Form key of the threshold slider.
pub const THRESHOLD_FIELD: &str = "threshold";
/// Form key of the importance checkbox.
pub const SHOW_IMPORTANCE_FIELD: &str = "show_importance";

const STYLE: &str = r#"
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; color: #222; }
fieldset { border: 1px solid #ddd; border-radius: 8px; margin-bottom: 1rem; }
.grid { display: grid; grid-template-columns: 1fr 1fr; gap: 0.75rem 1.5rem; }
label { display: flex; flex-direction: column; font-size: 0.9rem; }
button { background-color: #FF6B81; color: white; border: none; border-radius: 8px; padding: 0.6rem 1.2rem; font-weight: 600; }
.highlight-risk { color: #d62828; font-weight: 700; }
.highlight-safe { color: #2a9d8f; font-weight: 700; }
.interpretation { padding: 0.75rem 1rem; background-color: #f4f4f4; border-left: 4px solid #FF6B81; border-radius: 8px; }
.error { padding: 0.75rem 1rem; background-color: #fdecea; border-left: 4px solid #d62828; border-radius: 8px; }
.warning { padding: 0.75rem 1rem; background-color: #fff8e1; border-left: 4px solid #f4a261; border-radius: 8px; }
footer { margin-top: 2rem; text-align: center; font-size: 0.9rem; color: gray; }
"#;

/// Escape text for use in HTML content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Values shown in the form widgets.
#[derive(Debug, Clone)]
pub struct FormState {
    pub values: HashMap<String, String>,
    pub threshold: Threshold,
    pub show_importance: bool,
    /// Number of features the importance chart shows
    pub top_features: usize,
}

impl FormState {
    /// Untouched form: every widget at its declared default.
    pub fn initial(threshold: Threshold, top_features: usize) -> Self {
        Self {
            values: HashMap::new(),
            threshold,
            show_importance: false,
            top_features,
        }
    }

    fn value(&self, spec: &FieldSpec) -> String {
        self.values
            .get(spec.column)
            .cloned()
            .unwrap_or_else(|| spec.default_value())
    }
}

/// What the result area of a page shows.
#[derive(Debug, Clone)]
pub enum Outcome {
    Prediction(PredictionResult),
    Failure { title: &'static str, detail: String },
}

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Heart Disease Risk Predictor</title>
<style>{STYLE}</style>
</head>
<body>
<h1>Heart Disease Risk Predictor</h1>
<p>This tool helps clinicians and staff identify patients who may be at risk for heart disease. Fill out the form to get an instant prediction.</p>
{body}
<footer><i>This tool is intended for preliminary health screening purposes only and should not be used for diagnosis or treatment. Always consult a licensed healthcare professional.</i></footer>
</body>
</html>
"#
    )
}

fn render_field(out: &mut String, spec: &FieldSpec, current: &str) {
    out.push_str(&format!("<label>{}", escape(spec.label)));
    match spec.kind {
        FieldKind::Numeric { min, max, step } => {
            out.push_str(&format!(
                r#"<input type="number" name="{}" min="{}" max="{}" step="{}" value="{}" required>"#,
                spec.column,
                min,
                max,
                step,
                escape(current)
            ));
        }
        FieldKind::Categorical { options } => {
            out.push_str(&format!(r#"<select name="{}">"#, spec.column));
            for option in options {
                let selected = if *option == current { " selected" } else { "" };
                out.push_str(&format!(
                    r#"<option value="{0}"{1}>{0}</option>"#,
                    escape(option),
                    selected
                ));
            }
            out.push_str("</select>");
        }
    }
    out.push_str("</label>\n");
}

/// Importance toggle. Submits to `/` on its own so it works without a prediction.
fn render_importance_toggle(out: &mut String, form: &FormState) {
    out.push_str(&format!(
        r#"<form method="get" action="/" id="importance-toggle"><label><span><input type="checkbox" name="{}" value="on"{} onchange="this.form.submit()"> Show top {} important features</span></label><noscript><button type="submit">Apply</button></noscript> <a href="/importance">Open the importance chart</a></form>"#,
        SHOW_IMPORTANCE_FIELD,
        if form.show_importance { " checked" } else { "" },
        form.top_features
    ));
    out.push('\n');
}

fn render_form(out: &mut String, form: &FormState) {
    out.push_str(r#"<form method="post" action="/predict">"#);
    out.push_str("\n<h2>Enter Patient Details</h2>\n");

    for group in [FieldGroup::HealthMetrics, FieldGroup::MedicalHistory] {
        out.push_str(&format!(
            "<fieldset><legend>{}</legend><div class=\"grid\">\n",
            escape(group.title())
        ));
        for spec in PATIENT_FIELDS.iter().filter(|s| s.group == group) {
            render_field(out, spec, &form.value(spec));
        }
        out.push_str("</div></fieldset>\n");
    }

    out.push_str(&format!(
        r#"<label>Risk Threshold (%) <output>{0}</output><input type="range" name="{1}" min="0" max="{2}" step="1" value="{0}" oninput="this.previousElementSibling.value=this.value"></label>"#,
        form.threshold.percent(),
        THRESHOLD_FIELD,
        Threshold::MAX_PERCENT
    ));
    // Carry the toggle through a submission.
    if form.show_importance {
        out.push_str(&format!(
            r#"<input type="hidden" name="{}" value="on">"#,
            SHOW_IMPORTANCE_FIELD
        ));
    }
    out.push_str("\n<button type=\"submit\">Check Risk</button>\n</form>\n");
}

fn render_outcome(out: &mut String, outcome: &Outcome) {
    out.push_str("<hr>\n");
    match outcome {
        Outcome::Prediction(result) => {
            let class = if result.label.is_at_risk() {
                "highlight-risk"
            } else {
                "highlight-safe"
            };
            out.push_str(&format!(
                r#"<section id="result">
<h2>Prediction Result</h2>
<p>Risk Classification: <span class="{}">{}</span></p>
<p><strong>Confidence Score:</strong> <code>{}</code></p>
<p><em>Threshold Used: {}</em></p>
<div class="interpretation">
<p><strong>Interpretation:</strong> {}</p>
<p>{}</p>
</div>
</section>
"#,
                class,
                result.label,
                result.confidence_display(),
                result.threshold_display(),
                escape(&result.interpretation()),
                escape(DISCLAIMER)
            ));
        }
        Outcome::Failure { title, detail } => {
            out.push_str(&format!(
                "<section id=\"result\" class=\"error\"><h2>{}</h2><pre>{}</pre></section>\n",
                escape(title),
                escape(detail)
            ));
        }
    }
}

fn render_importance(out: &mut String, report: &ImportanceReport) {
    out.push_str("<section id=\"importance\">\n");
    match report {
        ImportanceReport::Chart { svg, features } => {
            out.push_str("<figure>\n");
            out.push_str(svg);
            out.push_str("\n<figcaption><ol>");
            for feature in features {
                out.push_str(&format!(
                    "<li>{} ({:.4})</li>",
                    escape(&feature.feature),
                    feature.importance
                ));
            }
            out.push_str("</ol></figcaption>\n</figure>\n");
        }
        ImportanceReport::Warning { detail } => {
            out.push_str(&format!(
                "<div class=\"warning\">{}</div>\n<pre>{}</pre>\n",
                WARNING_MESSAGE,
                escape(detail)
            ));
        }
    }
    out.push_str("</section>\n");
}

/// Full form page, optionally followed by a result and the importance section.
pub fn page(
    form: &FormState,
    outcome: Option<&Outcome>,
    importance: Option<&ImportanceReport>,
) -> String {
    let mut body = String::new();
    render_importance_toggle(&mut body, form);
    render_form(&mut body, form);
    if let Some(outcome) = outcome {
        render_outcome(&mut body, outcome);
    }
    if let Some(report) = importance {
        render_importance(&mut body, report);
    }
    layout(&body)
}

/// Stand-alone importance page.
pub fn importance_page(report: &ImportanceReport) -> String {
    let mut body = String::from("<p><a href=\"/\">Back to the form</a></p>\n");
    render_importance(&mut body, report);
    layout(&body)
}
