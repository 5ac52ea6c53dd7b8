//! Domain types shared across the app.

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};

/// A user-defined grouping of points.
///
/// `generate_isochrones` gates whether any point in the category is eligible
/// for overlay fetching at all; `is_visible` additionally hides the category
/// (and its points) from fetching and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Stable identity, assigned at creation, never reused.
    pub id: String,
    pub name: String,
    /// Hex color for rendering, e.g. "#808080".
    pub color: String,
    /// Emoji marker.
    pub icon: String,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default = "default_true")]
    pub generate_isochrones: bool,
}

/// A point of interest placed by the user.
///
/// `category_id` is a non-owning reference; deleting the category deletes the
/// point. A point referencing a missing category is never kept around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub category_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Point {
    /// Display label: the name if set, else a shortened id.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("point {}", &self.id[..self.id.len().min(8)]),
        }
    }
}

/// Outcome of one isochrone fetch for one point: either the polygon
/// collection to draw, or the error that prevented it. Serializes as
/// `{"geojson": ...}` / `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsochroneResult {
    Geojson(FeatureCollection),
    Error(String),
}

impl IsochroneResult {
    pub fn is_error(&self) -> bool {
        matches!(self, IsochroneResult::Error(_))
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_missing_flags_default_to_true() {
        // Records persisted before the visibility/generation flags existed.
        let raw = r##"{"id":"c1","name":"General","color":"#808080","icon":"📍"}"##;
        let cat: Category = serde_json::from_str(raw).expect("category should deserialize");
        assert!(cat.is_visible);
        assert!(cat.generate_isochrones);
    }

    #[test]
    fn test_point_optional_fields_roundtrip() {
        let raw = r#"{"id":"p1","category_id":"c1","lat":50.06,"lng":19.94,"is_visible":false}"#;
        let point: Point = serde_json::from_str(raw).expect("point should deserialize");
        assert!(!point.is_visible);
        assert!(point.name.is_none());
        assert!(point.link.is_none());

        let back = serde_json::to_string(&point).expect("point should serialize");
        assert!(!back.contains("\"name\""));
    }

    #[test]
    fn test_isochrone_result_serializes_externally_tagged() {
        let err = IsochroneResult::Error("boom".into());
        let raw = serde_json::to_string(&err).expect("result should serialize");
        assert_eq!(raw, r#"{"error":"boom"}"#);

        let ok = IsochroneResult::Geojson(FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        });
        let raw = serde_json::to_string(&ok).expect("result should serialize");
        assert!(raw.starts_with(r#"{"geojson":"#));
    }
}
