use serde::Serialize;
use std::collections::BTreeMap;

/// Axis-aligned box in original-image pixels, `[x1, y1, x2, y2]`.
pub type BoxCoords = [f32; 4];

/// One inference call's worth of detections.
///
/// Boxes, confidences, and class ids are parallel sequences: entry `i` of
/// each describes the same detected object. The fields stay private and grow
/// only through [`DetectionResult::push`], so the three always have equal
/// length. `names` maps every class id the model knows to its display name,
/// whether or not the class appears in this result.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    boxes: Vec<BoxCoords>,
    confidences: Vec<f32>,
    class_ids: Vec<u32>,
    names: BTreeMap<u32, String>,
}

/// One detection with its display name resolved, yielded by
/// [`DetectionResult::iter`].
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoxCoords,
    pub confidence: f32,
    pub class_id: u32,
    pub class_name: String,
}

impl DetectionResult {
    pub fn new(names: BTreeMap<u32, String>) -> Self {
        Self {
            boxes: Vec::new(),
            confidences: Vec::new(),
            class_ids: Vec::new(),
            names,
        }
    }

    pub fn push(&mut self, bbox: BoxCoords, confidence: f32, class_id: u32) {
        self.boxes.push(bbox);
        self.confidences.push(confidence);
        self.class_ids.push(class_id);
        debug_assert_eq!(self.boxes.len(), self.confidences.len());
        debug_assert_eq!(self.boxes.len(), self.class_ids.len());
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[BoxCoords] {
        &self.boxes
    }

    pub fn confidences(&self) -> &[f32] {
        &self.confidences
    }

    pub fn class_ids(&self) -> &[u32] {
        &self.class_ids
    }

    /// Display name for a class id, falling back to a stable placeholder for
    /// ids the label table does not cover.
    pub fn class_name(&self, class_id: u32) -> String {
        match self.names.get(&class_id) {
            Some(name) => name.clone(),
            None => format!("Unknown class {}", class_id),
        }
    }

    pub fn names(&self) -> &BTreeMap<u32, String> {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
        self.boxes
            .iter()
            .zip(&self.confidences)
            .zip(&self.class_ids)
            .map(|((bbox, confidence), class_id)| Detection {
                bbox: *bbox,
                confidence: *confidence,
                class_id: *class_id,
                class_name: self.class_name(*class_id),
            })
    }

    /// Wire form of the metadata: the parallel arrays plus per-detection
    /// resolved names.
    pub fn payload(&self) -> DetectionPayload<'_> {
        DetectionPayload {
            boxes: &self.boxes,
            confidences: &self.confidences,
            class_ids: &self.class_ids,
            class_names: self.class_ids.iter().map(|id| self.class_name(*id)).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetectionPayload<'a> {
    pub boxes: &'a [BoxCoords],
    pub confidences: &'a [f32],
    pub class_ids: &'a [u32],
    pub class_names: Vec<String>,
}
