use crate::config::LabelsConfig;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("failed to read labels file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid labels line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },
}

/// One class the model can emit: display name plus a fixed drawing color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabel {
    pub name: String,
    pub color: [u8; 3],
}

/// The class table, indexed by class id (= line number in the labels file).
/// Loaded once at startup; colors make the per-class assignment
/// deterministic across runs.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    labels: Vec<ClassLabel>,
}

impl ClassLabels {
    pub fn load(config: &LabelsConfig) -> Result<Self, LabelsError> {
        Self::from_file(&config.get_path())
    }

    pub fn from_file(path: &Path) -> Result<Self, LabelsError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut labels = Vec::new();

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            labels.push(parse_line(&line, index + 1)?);
        }

        Ok(Self { labels })
    }

    /// Build the table directly, bypassing the file format. Class ids are
    /// assigned by position.
    pub fn from_labels(labels: Vec<ClassLabel>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn name(&self, class_id: u32) -> Option<&str> {
        self.labels.get(class_id as usize).map(|l| l.name.as_str())
    }

    pub fn color(&self, class_id: u32) -> Option<[u8; 3]> {
        self.labels.get(class_id as usize).map(|l| l.color)
    }

    /// Full id → name map, the `names` the model hands out with every
    /// result.
    pub fn names_map(&self) -> BTreeMap<u32, String> {
        self.labels
            .iter()
            .enumerate()
            .map(|(id, label)| (id as u32, label.name.clone()))
            .collect()
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<ClassLabel, LabelsError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != 4 {
        return Err(LabelsError::InvalidLine {
            line: line_no,
            reason: format!("expected `name,r,g,b`, got {:?}", line),
        });
    }

    let name = parts[0].trim().to_string();
    let mut channels = [0u8; 3];
    for (slot, part) in channels.iter_mut().zip(&parts[1..]) {
        *slot = part.trim().parse().map_err(|_| LabelsError::InvalidLine {
            line: line_no,
            reason: format!("invalid color channel {:?}", part.trim()),
        })?;
    }

    Ok(ClassLabel {
        name,
        color: channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_color() {
        let label = parse_line("neutrophil, 255, 56, 56", 1).unwrap();
        assert_eq!(label.name, "neutrophil");
        assert_eq!(label.color, [255, 56, 56]);
    }

    #[test]
    fn rejects_missing_columns() {
        assert!(matches!(
            parse_line("neutrophil,255,56", 3),
            Err(LabelsError::InvalidLine { line: 3, .. })
        ));
    }

    #[test]
    fn rejects_non_numeric_channels() {
        assert!(parse_line("neutrophil,red,56,56", 1).is_err());
        assert!(parse_line("neutrophil,300,56,56", 1).is_err());
    }

    #[test]
    fn lookups_are_indexed_by_class_id() {
        let labels = ClassLabels::from_labels(vec![
            ClassLabel {
                name: "neutrophil".into(),
                color: [255, 56, 56],
            },
            ClassLabel {
                name: "band".into(),
                color: [72, 249, 10],
            },
        ]);

        assert_eq!(labels.name(1), Some("band"));
        assert_eq!(labels.color(0), Some([255, 56, 56]));
        assert_eq!(labels.name(9), None);
        assert_eq!(labels.names_map().len(), 2);
    }
}
