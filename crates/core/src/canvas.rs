//! Canvas document types.
//!
//! Only the fields the engine reads are typed; everything else on the
//! document, its elements and its files is carried in `extra` so a load/save
//! cycle leaves unknown data untouched.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::geometry::Rect;
use crate::layers::PlacedElement;

pub const ELEMENT_TYPE_IMAGE: &str = "image";

/// Upper bound (exclusive) of element `seed` / `versionNonce` values.
const SEED_RANGE: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    #[serde(default)]
    pub elements: Vec<CanvasElement>,
    #[serde(default)]
    pub files: BTreeMap<String, CanvasFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CanvasDocument {
    /// Rectangles of the live image elements, the obstacles for placement.
    pub fn image_rects(&self) -> Vec<Rect> {
        self.elements
            .iter()
            .filter(|e| e.is_live_image())
            .map(CanvasElement::rect)
            .collect()
    }

    /// Append elements and their file entries, keyed by element id.
    pub fn append(&mut self, entries: impl IntoIterator<Item = (CanvasElement, CanvasFile)>) {
        for (element, file) in entries {
            self.files.insert(element.id.clone(), file);
            self.elements.push(element);
        }
    }
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CanvasElement {
    pub fn is_live_image(&self) -> bool {
        self.element_type == ELEMENT_TYPE_IMAGE && !self.is_deleted
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// A fresh image element referencing file `file_id`.
    pub fn new_image(file_id: &str, geometry: &Rect) -> Self {
        let mut rng = rand::rng();
        let extra = json!({
            "angle": 0,
            "strokeColor": "#000000",
            "backgroundColor": "transparent",
            "fillStyle": "solid",
            "strokeWidth": 1,
            "strokeStyle": "solid",
            "roughness": 0,
            "opacity": 100,
            "groupIds": [],
            "frameId": null,
            "roundness": null,
            "boundElements": null,
            "index": null,
            "seed": rng.random_range(0..SEED_RANGE),
            "version": 1,
            "versionNonce": rng.random_range(0..SEED_RANGE),
            "updated": chrono::Utc::now().timestamp_millis(),
            "link": null,
            "locked": false,
            "status": "saved",
            "scale": [1, 1],
            "crop": null,
        });

        Self {
            element_type: ELEMENT_TYPE_IMAGE.to_string(),
            id: file_id.to_string(),
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            is_deleted: false,
            file_id: Some(file_id.to_string()),
            extra: match extra {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasFile {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub id: String,
    #[serde(rename = "dataURL")]
    pub data_url: String,
    #[serde(default)]
    pub created: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

impl PlacedElement {
    /// Canvas element and file entry for this placed element.
    pub fn to_canvas(&self) -> (CanvasElement, CanvasFile) {
        let element = CanvasElement::new_image(&self.blob.file_id, &self.geometry);
        let file = CanvasFile {
            mime_type: self.blob.mime_type.clone(),
            id: self.blob.file_id.clone(),
            data_url: self.blob.data_url(),
            created: chrono::Utc::now().timestamp_millis(),
            extra: Map::new(),
        };
        (element, file)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StoredBlob;

    const DOC: &str = r##"{
        "elements": [
            {"type": "image", "id": "a", "x": 0, "y": 0, "width": 100, "height": 50,
             "isDeleted": false, "fileId": "a", "seed": 42, "customData": {"k": 1}},
            {"type": "image", "id": "b", "x": 500, "y": 0, "width": 10, "height": 10,
             "isDeleted": true, "fileId": "b"},
            {"type": "rectangle", "id": "c", "x": 200, "y": 200, "width": 10, "height": 10}
        ],
        "files": {
            "a": {"mimeType": "image/png", "id": "a", "dataURL": "/api/file/a.png",
                  "created": 1, "lastRetrieved": 2}
        },
        "appState": {"viewBackgroundColor": "#fff"}
    }"##;

    #[test]
    fn only_live_images_are_obstacles() {
        let doc: CanvasDocument = serde_json::from_str(DOC).unwrap();
        assert_eq!(doc.image_rects(), vec![Rect::new(0.0, 0.0, 100.0, 50.0)]);
    }

    #[test]
    fn unknown_fields_round_trip() {
        let doc: CanvasDocument = serde_json::from_str(DOC).unwrap();
        let back: Value = serde_json::to_value(&doc).unwrap();

        assert_eq!(back["appState"]["viewBackgroundColor"], "#fff");
        assert_eq!(back["elements"][0]["customData"]["k"], 1);
        assert_eq!(back["elements"][0]["seed"], 42);
        assert_eq!(back["elements"][0]["isDeleted"], false);
        assert_eq!(back["elements"][2]["type"], "rectangle");
        assert_eq!(back["files"]["a"]["lastRetrieved"], 2);
        assert_eq!(back["files"]["a"]["dataURL"], "/api/file/a.png");
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let doc: CanvasDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.elements.is_empty());
        assert!(doc.files.is_empty());
    }

    #[test]
    fn placed_element_becomes_image_element_and_file() {
        let placed = PlacedElement {
            geometry: Rect::new(10.0, 20.0, 30.0, 40.0),
            blob: StoredBlob {
                file_id: "im_abcd1234".into(),
                file_name: "im_abcd1234.png".into(),
                stored_path: "/files/im_abcd1234.png".into(),
                mime_type: "image/png".into(),
            },
            content: "logo".into(),
        };
        let (element, file) = placed.to_canvas();

        assert!(element.is_live_image());
        assert_eq!(element.rect(), placed.geometry);
        assert_eq!(element.file_id.as_deref(), Some("im_abcd1234"));
        assert_eq!(file.data_url, "/api/file/im_abcd1234.png");

        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["fileId"], "im_abcd1234");
        assert_eq!(json["version"], 1);
        assert_eq!(json["status"], "saved");
        assert_eq!(json["scale"], json!([1, 1]));
        assert!(json["seed"].as_i64().unwrap() < SEED_RANGE);

        let mut doc = CanvasDocument::default();
        doc.append([(element, file)]);
        assert_eq!(doc.elements.len(), 1);
        assert!(doc.files.contains_key("im_abcd1234"));
    }
}
