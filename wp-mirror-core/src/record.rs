//! Source records and their canonical output projection.
//!
//! A [`SourceRecord`] is one row of a collection with the fields the pipeline
//! relies on pulled out into typed members; everything else is carried along
//! untouched in `fields`. [`SourceRecord::to_output_record`] produces the
//! [`OutputRecord`] that becomes the metadata file (and, for posts and pages,
//! the body file) in the destination.

use serde_json::{json, Map, Value};
use std::fmt;

use crate::config::Endpoint;
use crate::error::SyncError;
use crate::fetch::{Dictionaries, Dictionary};
use crate::file_map::{FileContent, FileMap};
use crate::media::MediaLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Post,
    Page,
    Media,
}

impl ContentKind {
    /// REST collection name.
    pub fn collection(self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::Page => "pages",
            ContentKind::Media => "media",
        }
    }

    /// Field documentation linked from every metadata file.
    pub fn field_reference(self) -> &'static str {
        match self {
            ContentKind::Post => "https://developer.wordpress.org/rest-api/reference/posts/",
            ContentKind::Page => "https://developer.wordpress.org/rest-api/reference/pages/",
            ContentKind::Media => "https://developer.wordpress.org/rest-api/reference/media/",
        }
    }

    pub fn commit_title(self, updates: usize) -> String {
        let label = match self {
            ContentKind::Post => "Posts",
            ContentKind::Page => "Pages",
            ContentKind::Media => "Media",
        };
        format!("Wordpress {label} Update ({updates} updates)")
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// One row of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub kind: ContentKind,
    pub id: u64,
    pub slug: String,
    /// Public link (posts, pages).
    pub link: Option<String>,
    /// Upload URL (media).
    pub source_url: Option<String>,
    /// `None` when unset or `0`.
    pub featured_media: Option<u64>,
    /// Every field of the row, already flattened.
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn from_row(kind: ContentKind, row: Value) -> Result<Self, SyncError> {
        let Value::Object(fields) = row else {
            return Err(SyncError::Record {
                kind,
                message: "row is not a JSON object".into(),
            });
        };
        let id = fields.get("id").and_then(Value::as_u64).ok_or_else(|| SyncError::Record {
            kind,
            message: "missing numeric id".into(),
        })?;
        let slug = fields
            .get("slug")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::Record {
                kind,
                message: format!("record {id} has no slug"),
            })?
            .to_string();
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            kind,
            id,
            slug,
            link: text("link"),
            source_url: text("source_url"),
            featured_media: fields
                .get("featured_media")
                .and_then(Value::as_u64)
                .filter(|id| *id != 0),
            fields,
        })
    }

    /// Body HTML as stored in the body file.
    pub fn body_html(&self) -> String {
        cleanup_content(self.fields.get("content").and_then(Value::as_str).unwrap_or_default())
    }

    /// Project a post or page into its output record, attaching media usage
    /// when a media library is available.
    pub fn to_output_record(
        &self,
        endpoint: &Endpoint,
        dictionaries: &Dictionaries,
        media: Option<&MediaLibrary>,
    ) -> OutputRecord {
        let mut data = self.base_data(&dictionaries.users);
        if let Some(link) = &self.link {
            data.insert("wordpress_url".into(), Value::String(link.clone()));
        }
        if self.kind == ContentKind::Post {
            for (field, dictionary) in [("categories", &dictionaries.categories), ("tags", &dictionaries.tags)] {
                if let Some(ids) = data.get(field).and_then(Value::as_array) {
                    let names = resolve_names(ids, dictionary);
                    data.insert(field.into(), Value::Array(names));
                }
            }
        }

        let body = self.body_html();
        if let Some(library) = media {
            let usage = library.usage(&body, self.featured_media);
            if !usage.is_empty() {
                data.insert("media".into(), Value::Array(usage));
            }
        }
        remove_excluded(&mut data, &endpoint.exclude_properties);

        OutputRecord {
            kind: self.kind,
            slug: self.slug.clone(),
            data,
            body: Some(body),
        }
    }

    /// Copy of every field with `author` replaced by its display name.
    pub(crate) fn base_data(&self, users: &Dictionary) -> Map<String, Value> {
        let mut data = self.fields.clone();
        let author = data.get("author").and_then(Value::as_u64).and_then(|id| users.get(&id));
        match author {
            Some(name) => {
                data.insert("author".into(), Value::String(name.clone()));
            }
            None => {
                data.remove("author");
            }
        }
        data
    }
}

/// Canonical projection of a source record.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub kind: ContentKind,
    pub slug: String,
    pub data: Map<String, Value>,
    /// Cleaned body HTML; `None` for media.
    pub body: Option<String>,
}

impl OutputRecord {
    /// `{meta: {...provenance}, data: {...}}`.
    pub fn wrap(&self, endpoint: &Endpoint) -> Value {
        let mut meta = Map::new();
        if let Some(created) = self.data.get("date_gmt") {
            meta.insert("created_date".into(), created.clone());
        }
        if let Some(updated) = self.data.get("modified_gmt") {
            meta.insert("updated_date".into(), updated.clone());
        }
        meta.insert("field_reference".into(), json!(self.kind.field_reference()));
        meta.insert("api_version".into(), json!("v2"));
        meta.insert("api_url".into(), json!(endpoint.api_url()));
        meta.insert(
            "process".into(),
            json!({
                "source_code": env!("CARGO_PKG_REPOSITORY"),
                "source_data": endpoint.wordpress_url,
                "deployment_target": endpoint.target.deployment_url(),
            }),
        );
        meta.insert("refresh_frequency".into(), json!("as needed"));

        json!({ "meta": Value::Object(meta), "data": Value::Object(self.data.clone()) })
    }

    /// Register the metadata and body files under the record's slug.
    pub fn insert_into(&self, endpoint: &Endpoint, files: &mut FileMap) {
        files.insert(format!("{}.json", self.slug), FileContent::Json(self.wrap(endpoint)));
        if let Some(body) = &self.body {
            files.insert(format!("{}.html", self.slug), FileContent::Text(body.clone()));
        }
    }
}

/// Normalise stored HTML: every `\n\n\n` becomes `\n`, then one leading newline is dropped.
pub fn cleanup_content(html: &str) -> String {
    let collapsed = html.replace("\n\n\n", "\n");
    match collapsed.strip_prefix('\n') {
        Some(rest) => rest.to_string(),
        None => collapsed,
    }
}

pub fn remove_excluded(data: &mut Map<String, Value>, excluded: &[String]) {
    for field in excluded {
        data.remove(field);
    }
}

/// Unknown ids become `null`, keeping positions aligned with the source array.
fn resolve_names(ids: &[Value], dictionary: &Dictionary) -> Vec<Value> {
    ids.iter()
        .map(|id| {
            id.as_u64()
                .and_then(|id| dictionary.get(&id))
                .map_or(Value::Null, |name| Value::String(name.clone()))
        })
        .collect()
}
