use std::fs;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tempfile::Builder;

use crate::error::AirError;

/// Root of the metadata document. Keys other than `items` are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// `Some(None)` is an explicit `"meta": null`, written back as such.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta: Option<Option<ItemMeta>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<Vec<DownloadRecord>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn meta(&self) -> Option<&ItemMeta> {
        self.meta.as_ref().and_then(Option::as_ref)
    }

    pub fn push_download(&mut self, record: DownloadRecord) {
        self.downloads.get_or_insert_with(Vec::new).push(record);
    }

    pub fn downloads(&self) -> &[DownloadRecord] {
        self.downloads.as_deref().unwrap_or_default()
    }

    pub fn is_recorded(&self, url: &str) -> bool {
        self.downloads().iter().any(|record| record.url == url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    #[serde(
        rename = "copiedMessage",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub copied_message: Option<Value>,
    /// Kept as raw JSON so entries that are not strings survive a rewrite.
    #[serde(
        rename = "downloadlinks",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_links: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemMeta {
    /// The trimmed `copiedMessage`, if it is a non-blank string.
    pub fn copied_message(&self) -> Option<&str> {
        self.copied_message
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Entries of `downloadlinks`; anything but an array reads as empty.
    pub fn download_links(&self) -> &[Value] {
        self.download_links
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

// Only called for keys that are present, so `null` becomes `Some(Value::Null)`
// (or `Some(None)`) while a missing key stays `None` through `default`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub url: String,
    /// Absolute path of the stored file; the key name is kept for compatibility.
    pub relative_path: String,
    pub size_bytes: u64,
}

pub struct MetadataStore;

impl MetadataStore {
    pub fn load(path: &Utf8Path) -> Result<MetadataDocument, AirError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
            AirError::DocumentRead {
                path: path.as_std_path().to_path_buf(),
                message: err.to_string(),
            }
        })?;
        serde_json::from_str(&content).map_err(|err| AirError::DocumentParse(err.to_string()))
    }

    /// Atomically replaces `path` with `document` when `changed` is set.
    /// Returns whether the file was written.
    pub fn save_if_changed(
        path: &Utf8Path,
        document: &MetadataDocument,
        changed: bool,
    ) -> Result<bool, AirError> {
        if !changed {
            tracing::debug!(path = %path, "metadata unchanged, skipping write");
            return Ok(false);
        }
        Self::write_atomic(path, document).map_err(|message| AirError::DocumentWrite {
            path: path.as_std_path().to_path_buf(),
            message,
        })?;
        tracing::debug!(path = %path, "metadata document replaced");
        Ok(true)
    }

    fn write_atomic(path: &Utf8Path, document: &MetadataDocument) -> Result<(), String> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let mut temp = Builder::new()
            .prefix(".air-dl-meta")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| err.to_string())?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, document).map_err(|err| err.to_string())?;
            writer.flush().map_err(|err| err.to_string())?;
        }
        temp.as_file().sync_all().map_err(|err| err.to_string())?;
        temp.persist(path.as_std_path())
            .map_err(|err| err.error.to_string())?;
        Ok(())
    }
}
