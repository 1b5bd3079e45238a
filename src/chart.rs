//! SVG bar chart of ranked feature importances

use crate::importance::{FeatureImportance, ImportanceError};
use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;

const BAR_COLOR: RGBColor = RGBColor(255, 107, 129);

fn chart_error<E: std::fmt::Display>(e: E) -> ImportanceError {
    ImportanceError::Chart(e.to_string())
}

/// Chart title for a top-`top_n` ranking.
pub fn chart_title(top_n: usize) -> String {
    format!("Top {} Most Important Features", top_n)
}

/// Draw `features` (already ranked, largest first) as horizontal bars with
/// the largest on top. The title names the requested `top_n`, which may
/// exceed the number of bars. Returns the SVG document.
pub fn render_importance_chart(
    features: &[FeatureImportance],
    top_n: usize,
    width: u32,
    height: u32,
) -> Result<String, ImportanceError> {
    if features.is_empty() {
        return Err(ImportanceError::Chart("no features to plot".to_string()));
    }

    let n = features.len();
    let x_max = features
        .iter()
        .map(|f| f.importance)
        .fold(0.0_f64, f64::max);
    let x_max = if x_max > 0.0 { x_max * 1.1 } else { 1.0 };

    // Row 0 is drawn at the bottom, so the top-ranked feature takes row n - 1.
    let label_for = |v: &SegmentValue<usize>| match v {
        SegmentValue::Exact(row) | SegmentValue::CenterOf(row) if *row < n => {
            features[n - 1 - row].feature.clone()
        }
        _ => String::new(),
    };
    let longest = features.iter().map(|f| f.feature.len()).max().unwrap_or(0);
    let label_area = (longest as u32 * 8 + 16).clamp(60, (width / 2).max(60));

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(chart_title(top_n), ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(label_area)
            .build_cartesian_2d(0f64..x_max, (0..n).into_segmented())
            .map_err(chart_error)?;

        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(n)
            .y_label_formatter(&label_for)
            .x_desc("Importance Score")
            .y_desc("Features")
            .draw()
            .map_err(chart_error)?;

        chart
            .draw_series(
                Histogram::horizontal(&chart)
                    .style(BAR_COLOR.filled())
                    .margin(4)
                    .data(
                        features
                            .iter()
                            .enumerate()
                            .map(|(rank, f)| (n - 1 - rank, f.importance)),
                    ),
            )
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;
    }

    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, importance: f64) -> FeatureImportance {
        FeatureImportance {
            feature: name.to_string(),
            importance,
        }
    }

    #[test]
    fn test_chart_contains_title_and_labels() {
        let features = vec![
            feature("AgeCategory_80+", 0.31),
            feature("BMI", 0.22),
            feature("GenHealth_Poor", 0.08),
        ];
        let svg = render_importance_chart(&features, 3, 800, 480).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Top 3 Most Important Features"));
        assert!(svg.contains("BMI"));
        assert!(svg.contains("GenHealth_Poor"));
        assert!(svg.contains("<rect"));
    }

    #[test]
    fn test_title_uses_requested_count() {
        let features = vec![feature("BMI", 0.4), feature("SleepTime", 0.1)];
        let svg = render_importance_chart(&features, 10, 640, 360).unwrap();

        assert!(svg.contains("Top 10 Most Important Features"));
        assert!(!svg.contains("Top 2 Most Important Features"));
    }

    #[test]
    fn test_chart_handles_all_zero_scores() {
        let features = vec![feature("BMI", 0.0), feature("SleepTime", 0.0)];
        assert!(render_importance_chart(&features, 10, 640, 360).is_ok());
    }

    #[test]
    fn test_empty_chart_is_an_error() {
        let err = render_importance_chart(&[], 10, 640, 360).unwrap_err();
        assert!(matches!(err, ImportanceError::Chart(_)));
    }
}
