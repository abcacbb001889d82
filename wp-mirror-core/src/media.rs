//! Media library: destination paths for uploads, media metadata records and
//! the media-usage list attached to posts and pages.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::fetch::Dictionary;
use crate::file_map::{FileContent, FileMap};
use crate::record::{remove_excluded, OutputRecord, SourceRecord};

const UPLOADS_MARKER: &str = "/wp-content/uploads/";

/// Path of an upload below the uploads root.
///
/// `https://x/wp-content/uploads/2020/07/img.jpg` -> `2020/07/img.jpg`.
pub fn path_from_media_source_url(source_url: &str) -> Option<&str> {
    source_url
        .split_once(UPLOADS_MARKER)
        .map(|(_, path)| path)
        .filter(|path| !path.is_empty())
}

/// Metadata file for an upload: the file name up to its first `.`, plus `.json`.
pub fn metadata_path(upload_path: &str) -> String {
    let (dir, file) = match upload_path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, upload_path),
    };
    let stem = file.split('.').next().unwrap_or(file);
    match dir {
        Some(dir) => format!("{dir}/{stem}.json"),
        None => format!("{stem}.json"),
    }
}

/// One size variant of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSize {
    pub name: String,
    pub path: String,
    pub width: u64,
    pub source_url: String,
    /// The size as emitted in metadata: every source field plus `type` and `path`.
    pub json: Value,
}

/// A binary file the destination must hold for a media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBinary {
    pub path: String,
    /// As found in the source; may be relative.
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    pub id: u64,
    /// Metadata file path below the media prefix.
    pub metadata_path: String,
    /// Largest first. Empty for documents and other unsized uploads.
    pub sizes: Vec<MediaSize>,
    pub binaries: Vec<MediaBinary>,
}

impl MediaEntry {
    /// Build the entry and its metadata record. Returns `None` (after logging)
    /// for uploads whose URL does not sit under the uploads root.
    pub fn from_record(
        record: &SourceRecord,
        endpoint: &Endpoint,
        users: &Dictionary,
    ) -> Option<(MediaEntry, OutputRecord)> {
        let Some(source_url) = record.source_url.as_deref() else {
            warn!(id = record.id, slug = %record.slug, "Media record without source_url, skipping");
            return None;
        };
        let Some(upload_path) = path_from_media_source_url(source_url) else {
            warn!(id = record.id, source_url, "Media outside the uploads root, skipping");
            return None;
        };

        let mut data = record.base_data(users);
        data.insert("wordpress_url".into(), json!(source_url));
        remove_excluded(&mut data, &endpoint.exclude_properties);

        let sizes = collect_sizes(record);
        let binaries = if sizes.is_empty() {
            data.insert("path".into(), json!(upload_path));
            vec![MediaBinary {
                path: upload_path.to_string(),
                source_url: source_url.to_string(),
            }]
        } else {
            data.insert(
                "sizes".into(),
                Value::Array(sizes.iter().map(|s| s.json.clone()).collect()),
            );
            sizes
                .iter()
                .map(|s| MediaBinary {
                    path: s.path.clone(),
                    source_url: s.source_url.clone(),
                })
                .collect()
        };

        let entry = MediaEntry {
            id: record.id,
            metadata_path: metadata_path(upload_path),
            sizes,
            binaries,
        };
        let output = OutputRecord {
            kind: record.kind,
            slug: record.slug.clone(),
            data,
            body: None,
        };
        Some((entry, output))
    }
}

/// `media_details.sizes` as a list, widest first. Ties keep size-name order.
fn collect_sizes(record: &SourceRecord) -> Vec<MediaSize> {
    let Some(sizes) = record
        .fields
        .get("media_details")
        .and_then(|d| d.get("sizes"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let mut collected: Vec<MediaSize> = sizes
        .iter()
        .filter_map(|(name, size)| {
            let fields = size.as_object()?;
            let source_url = fields.get("source_url").and_then(Value::as_str)?;
            let Some(path) = path_from_media_source_url(source_url) else {
                warn!(id = record.id, size = %name, source_url, "Size outside the uploads root, skipping");
                return None;
            };
            let mut emitted = Map::new();
            emitted.insert("type".into(), json!(name));
            emitted.insert("path".into(), json!(path));
            emitted.extend(fields.clone());
            Some(MediaSize {
                name: name.clone(),
                path: path.to_string(),
                width: fields.get("width").and_then(Value::as_u64).unwrap_or(0),
                source_url: source_url.to_string(),
                json: Value::Object(emitted),
            })
        })
        .collect();
    collected.sort_by(|a, b| b.width.cmp(&a.width));
    collected
}

/// All media of one endpoint run, in fetch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaLibrary {
    entries: Vec<MediaEntry>,
}

impl MediaLibrary {
    /// Normalise media rows into the library plus the media file map: one
    /// metadata file per item and a placeholder per binary.
    pub fn build(records: &[SourceRecord], endpoint: &Endpoint, users: &Dictionary) -> (MediaLibrary, FileMap) {
        let mut library = MediaLibrary::default();
        let mut files = FileMap::new();
        for record in records {
            let Some((entry, output)) = MediaEntry::from_record(record, endpoint, users) else {
                continue;
            };
            for binary in &entry.binaries {
                files.insert(binary.path.clone(), FileContent::Placeholder);
            }
            files.insert(entry.metadata_path.clone(), FileContent::Json(output.wrap(endpoint)));
            debug!(id = entry.id, binaries = entry.binaries.len(), "Registered media item");
            library.entries.push(entry);
        }
        (library, files)
    }

    pub fn entries(&self) -> &[MediaEntry] {
        &self.entries
    }

    /// The item whose metadata was written last at `path`. Uploads that share
    /// a metadata file (`report.pdf`, `report.v2.pdf`) overwrite each other.
    pub fn by_metadata_path(&self, path: &str) -> Option<&MediaEntry> {
        self.entries.iter().rev().find(|e| e.metadata_path == path)
    }

    /// Sized media referenced by `html` (literal source URL substring) or
    /// featured by the record.
    pub fn usage(&self, html: &str, featured_media: Option<u64>) -> Vec<Value> {
        let mut used = Vec::new();
        for entry in &self.entries {
            let featured = featured_media == Some(entry.id);
            for size in &entry.sizes {
                let source_url_match = html.contains(&size.source_url);
                if !(featured || source_url_match) {
                    continue;
                }
                let mut item = Map::new();
                item.insert("id".into(), json!(entry.id));
                if let Value::Object(fields) = &size.json {
                    item.extend(fields.clone());
                }
                item.insert("source_url_match".into(), json!(source_url_match));
                item.insert("featured".into(), json!(featured));
                used.push(Value::Object(item));
            }
        }
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryTarget;
    use crate::record::ContentKind;

    fn endpoint() -> Endpoint {
        Endpoint {
            name: "demo".into(),
            enabled: true,
            enabled_local: true,
            reporting_channel: None,
            wordpress_url: "https://example.org".into(),
            exclude_properties: vec!["_links".into()],
            target: RepositoryTarget {
                owner: "org".into(),
                repo: "site".into(),
                branch: "main".into(),
                sync_media: true,
                media_path: "media".into(),
                post_path: "posts".into(),
                page_path: "pages".into(),
            },
        }
    }

    fn image_record() -> SourceRecord {
        SourceRecord::from_row(
            ContentKind::Media,
            json!({
                "id": 10,
                "slug": "img",
                "author": 1,
                "source_url": "https://example.org/wp-content/uploads/2020/07/img.jpg",
                "_links": {},
                "media_details": {"sizes": {
                    "thumbnail": {"width": 150, "height": 150, "source_url": "https://example.org/wp-content/uploads/2020/07/img-150x150.jpg"},
                    "full": {"width": 1200, "height": 800, "source_url": "https://example.org/wp-content/uploads/2020/07/img.jpg"},
                    "medium": {"width": 300, "height": 200, "source_url": "/wp-content/uploads/2020/07/img-300x200.jpg"}
                }}
            }),
        )
        .unwrap()
    }

    fn document_record() -> SourceRecord {
        SourceRecord::from_row(
            ContentKind::Media,
            json!({
                "id": 11,
                "slug": "report",
                "source_url": "https://example.org/wp-content/uploads/2021/01/report.v2.pdf",
                "media_details": {}
            }),
        )
        .unwrap()
    }

    #[test]
    fn derives_path_after_uploads_root() {
        assert_eq!(
            path_from_media_source_url("https://x/wp-content/uploads/2020/07/img.jpg"),
            Some("2020/07/img.jpg")
        );
        assert_eq!(
            path_from_media_source_url("/wp-content/uploads/2020/07/img.jpg"),
            Some("2020/07/img.jpg")
        );
        assert_eq!(path_from_media_source_url("https://x/elsewhere/img.jpg"), None);
    }

    #[test]
    fn metadata_path_strips_extension_from_file_name_only() {
        assert_eq!(metadata_path("2020/07/img.jpg"), "2020/07/img.json");
        assert_eq!(metadata_path("2021/01/report.v2.pdf"), "2021/01/report.json");
        assert_eq!(metadata_path("v1.2/logo.png"), "v1.2/logo.json");
        assert_eq!(metadata_path("plain"), "plain.json");
    }

    #[test]
    fn sized_media_lists_sizes_widest_first_with_placeholders() {
        let users: Dictionary = [(1, "Ada".to_string())].into_iter().collect();
        let (library, files) = MediaLibrary::build(&[image_record()], &endpoint(), &users);

        let entry = &library.entries()[0];
        let widths: Vec<u64> = entry.sizes.iter().map(|s| s.width).collect();
        assert_eq!(widths, vec![1200, 300, 150]);
        assert_eq!(entry.metadata_path, "2020/07/img.json");

        assert_eq!(files.len(), 4, "three binaries plus one metadata file");
        assert_eq!(files.get("2020/07/img-300x200.jpg"), Some(&FileContent::Placeholder));
        let Some(FileContent::Json(meta)) = files.get("2020/07/img.json") else {
            panic!("metadata file missing");
        };
        assert_eq!(meta["data"]["author"], json!("Ada"));
        assert_eq!(meta["data"]["sizes"][0]["type"], json!("full"));
        assert_eq!(meta["data"]["sizes"][2]["path"], json!("2020/07/img-150x150.jpg"));
        assert!(meta["data"].get("_links").is_none());
        assert!(meta["data"].get("path").is_none());
    }

    #[test]
    fn unsized_media_is_a_single_binary() {
        let (library, files) = MediaLibrary::build(&[document_record()], &endpoint(), &Dictionary::new());
        let entry = &library.entries()[0];
        assert!(entry.sizes.is_empty());
        assert_eq!(entry.binaries.len(), 1);
        assert_eq!(files.get("2021/01/report.v2.pdf"), Some(&FileContent::Placeholder));
        let Some(FileContent::Json(meta)) = files.get("2021/01/report.json") else {
            panic!("metadata file missing");
        };
        assert_eq!(meta["data"]["path"], json!("2021/01/report.v2.pdf"));
    }

    #[test]
    fn usage_matches_url_substrings_and_featured_media() {
        let (library, _) = MediaLibrary::build(&[image_record(), document_record()], &endpoint(), &Dictionary::new());

        let html = r#"<img src="https://example.org/wp-content/uploads/2020/07/img-150x150.jpg">"#;
        let used = library.usage(html, None);
        assert_eq!(used.len(), 1);
        assert_eq!(used[0]["id"], json!(10));
        assert_eq!(used[0]["type"], json!("thumbnail"));
        assert_eq!(used[0]["source_url_match"], json!(true));
        assert_eq!(used[0]["featured"], json!(false));

        let featured = library.usage("<p>no images</p>", Some(10));
        assert_eq!(featured.len(), 3, "every size of the featured item is listed");
        assert!(featured.iter().all(|u| u["featured"] == json!(true)));

        assert!(library.usage("<p>no images</p>", Some(11)).is_empty(), "unsized media never counts");
        assert!(library.usage("<p>no images</p>", None).is_empty());
    }

    #[test]
    fn shared_metadata_path_resolves_to_the_item_written_last() {
        let first = SourceRecord::from_row(
            ContentKind::Media,
            json!({
                "id": 20,
                "slug": "report",
                "source_url": "https://example.org/wp-content/uploads/2021/01/report.pdf"
            }),
        )
        .unwrap();
        let (library, files) = MediaLibrary::build(&[first, document_record()], &endpoint(), &Dictionary::new());

        let Some(FileContent::Json(meta)) = files.get("2021/01/report.json") else {
            panic!("metadata file missing");
        };
        assert_eq!(meta["data"]["id"], json!(11));

        let entry = library.by_metadata_path("2021/01/report.json").expect("entry");
        assert_eq!(entry.id, 11);
        assert_eq!(entry.binaries[0].path, "2021/01/report.v2.pdf");
    }
}
