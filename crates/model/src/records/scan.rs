use crate::core::identifiers::{FileId, SourceScanId, UploadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Characters that are invalid in file names on at least one supported
/// platform.
const INVALID_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Metadata for one image file attached to a scan, as reported by the
/// source instance. The optional fields come from the compliance report
/// join and may be absent; the engine passes them through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanImage {
    pub file_id: FileId,
    pub original_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_pog_id: Option<i64>,
}

impl ScanImage {
    /// Local file name for a downloaded image:
    /// `{scan_id}_{section_name}_{store_pog_id}.ext`, dropping whichever
    /// optional parts are absent, down to `{scan_id}.ext`. The extension
    /// comes from the original filename, defaulting to `.jpg`.
    pub fn file_name(&self, scan_id: SourceScanId) -> String {
        let ext = self
            .original_filename
            .rsplit_once('.')
            .map(|(_, e)| format!(".{e}"))
            .unwrap_or_else(|| ".jpg".to_string());

        let mut parts = vec![scan_id.to_string()];
        if let Some(section) = &self.section_name {
            parts.push(sanitize_filename(section));
        }
        if let Some(store_pog_id) = self.store_pog_id {
            parts.push(store_pog_id.to_string());
        }

        format!("{}{}", parts.join("_"), ext)
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    cleaned.trim_matches(['.', ' ']).to_string()
}

/// One scan record fetched from the source instance: the raw provided
/// values the create call will be rebuilt from, plus its file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: SourceScanId,
    pub provided_values: Value,
    pub files: Vec<ScanImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// Fields stripped from the source payload before posting it to the
/// target instance; they are assigned fresh by the target.
const DROPPED_PAYLOAD_FIELDS: [&str; 4] = ["task_id", "id", "created_at", "updated_at"];

impl ScanRecord {
    /// The raw create payload embedded in `provided_values`. Records
    /// store it either under a `_raw_data` key or as the top-level
    /// object; anything else is unusable.
    pub fn raw_data(&self) -> Option<&serde_json::Map<String, Value>> {
        let obj = self.provided_values.as_object()?;
        match obj.get("_raw_data") {
            Some(raw) => raw.as_object(),
            None => Some(obj),
        }
    }

    /// Rebuilds the create payload for the target instance: the source
    /// payload re-pointed at the target store, with the freshly uploaded
    /// file handles and capture timestamp, and target-assigned fields
    /// stripped. Returns `None` when the record carries no usable payload.
    pub fn create_payload(
        &self,
        target_store_id: i64,
        captured_at: i64,
        uploads: &[UploadId],
    ) -> Option<Value> {
        let mut data = self.raw_data()?.clone();

        data.insert("store".to_string(), Value::from(target_store_id));
        data.insert("captured_at".to_string(), Value::from(captured_at));
        data.insert(
            "files".to_string(),
            Value::Array(
                uploads
                    .iter()
                    .map(|u| Value::String(u.as_str().to_string()))
                    .collect(),
            ),
        );
        for field in DROPPED_PAYLOAD_FIELDS {
            data.remove(field);
        }

        Some(Value::Object(data))
    }
}

/// An image fetched from the source instance, held in memory until the
/// upload stage hands it to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    pub file_id: FileId,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(section: Option<&str>, store_pog: Option<i64>) -> ScanImage {
        ScanImage {
            file_id: FileId::new(77),
            original_filename: "shelf.png".to_string(),
            section_name: section.map(str::to_string),
            store_pog_id: store_pog,
        }
    }

    #[test]
    fn file_name_degrades_through_all_forms() {
        let scan = SourceScanId::new(42);

        assert_eq!(
            image(Some("Aisle 3"), Some(900)).file_name(scan),
            "42_Aisle 3_900.png"
        );
        assert_eq!(image(Some("Aisle 3"), None).file_name(scan), "42_Aisle 3.png");
        assert_eq!(image(None, Some(900)).file_name(scan), "42_900.png");
        assert_eq!(image(None, None).file_name(scan), "42.png");
    }

    #[test]
    fn file_name_sanitizes_hostile_sections_and_defaults_extension() {
        let scan = SourceScanId::new(7);
        let mut img = image(Some("Dairy/Eggs: \"A\""), None);
        img.original_filename = "noextension".to_string();

        assert_eq!(img.file_name(scan), "7_Dairy_Eggs_ _A_.jpg");
    }

    fn record(provided_values: Value) -> ScanRecord {
        ScanRecord {
            id: SourceScanId::new(5),
            provided_values,
            files: vec![image(None, None)],
            section_name: None,
        }
    }

    #[test]
    fn create_payload_rewrites_store_files_and_timestamp() {
        let rec = record(json!({
            "_raw_data": {
                "store": 1,
                "id": 5,
                "task_id": "abc",
                "created_at": "2024-01-01",
                "updated_at": "2024-01-02",
                "aisle": "A3"
            }
        }));

        let payload = rec
            .create_payload(99, 1_700_000_000, &[UploadId::new("u-1"), UploadId::new("u-2")])
            .unwrap();

        assert_eq!(payload["store"], json!(99));
        assert_eq!(payload["captured_at"], json!(1_700_000_000));
        assert_eq!(payload["files"], json!(["u-1", "u-2"]));
        assert_eq!(payload["aisle"], json!("A3"));
        for dropped in DROPPED_PAYLOAD_FIELDS {
            assert!(payload.get(dropped).is_none(), "{dropped} should be stripped");
        }
    }

    #[test]
    fn create_payload_accepts_top_level_object() {
        let rec = record(json!({ "store": 1, "aisle": "B1" }));
        let payload = rec.create_payload(3, 10, &[]).unwrap();
        assert_eq!(payload["store"], json!(3));
        assert_eq!(payload["aisle"], json!("B1"));
    }

    #[test]
    fn create_payload_rejects_non_object_values() {
        assert!(record(json!(null)).create_payload(3, 10, &[]).is_none());
        assert!(record(json!("raw")).create_payload(3, 10, &[]).is_none());
        assert!(
            record(json!({ "_raw_data": 17 }))
                .create_payload(3, 10, &[])
                .is_none()
        );
    }
}
