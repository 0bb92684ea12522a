use crate::detections::{BoxCoords, DetectionResult};
use serde::Serialize;

/// Shown instead of the table when a scan comes back clean. An empty
/// result is a normal outcome, not an error.
pub const NO_DETECTIONS_MESSAGE: &str = "No neutrophils detected above the confidence threshold.";

/// One table row per detection, confidence already formatted for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetectionRow {
    pub confidence: String,
    pub class_id: u32,
    pub class_name: String,
    pub bbox: BoxCoords,
}

/// The per-image report rendered next to the annotated picture.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetectionSummary {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub rows: Vec<DetectionRow>,
}

impl DetectionSummary {
    pub fn from_result(result: &DetectionResult) -> Self {
        if result.is_empty() {
            return Self {
                count: 0,
                message: Some(NO_DETECTIONS_MESSAGE.to_string()),
                rows: Vec::new(),
            };
        }

        let rows = result
            .iter()
            .map(|detection| DetectionRow {
                confidence: format!("{:.2}", detection.confidence),
                class_id: detection.class_id,
                class_name: detection.class_name,
                bbox: detection.bbox,
            })
            .collect();

        Self {
            count: result.len(),
            message: None,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn names() -> BTreeMap<u32, String> {
        let mut names = BTreeMap::new();
        names.insert(0, "neutrophil".to_string());
        names
    }

    #[test]
    fn confidences_are_formatted_to_two_decimals() {
        let mut result = DetectionResult::new(names());
        result.push([1., 2., 3., 4.], 0.8765, 0);
        result.push([5., 6., 7., 8.], 0.5, 0);

        let summary = DetectionSummary::from_result(&result);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.message, None);
        assert_eq!(summary.rows[0].confidence, "0.88");
        assert_eq!(summary.rows[1].confidence, "0.50");
        assert_eq!(summary.rows[0].class_name, "neutrophil");
    }

    #[test]
    fn empty_results_report_a_message_instead_of_rows() {
        let summary = DetectionSummary::from_result(&DetectionResult::new(names()));

        assert_eq!(summary.count, 0);
        assert_eq!(summary.message.as_deref(), Some(NO_DETECTIONS_MESSAGE));
        assert!(summary.rows.is_empty());
    }

    #[test]
    fn summary_serializes_without_a_message_when_populated() {
        let mut result = DetectionResult::new(names());
        result.push([1., 2., 3., 4.], 0.9, 0);

        let json = serde_json::to_value(DetectionSummary::from_result(&result)).unwrap();
        assert!(json.get("message").is_none());
        assert_eq!(json["rows"][0]["confidence"], "0.90");
    }
}
