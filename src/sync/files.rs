//! Downloads Slack file attachments into the archive directory and records
//! them in the store. Ingestion is best-effort: a failed file never fails the
//! message sync that referenced it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use image::ImageFormat;
use tracing::{debug, warn};

use crate::api::SlackClient;
use crate::models::file::FileObject;
use crate::store::db::StoreConnection;
use crate::store::models::NewFile;
use crate::store::operations;

/// Thumbnail edge lengths derived for every stored image.
pub const THUMB_SIZES: [u32; 4] = [150, 300, 600, 1200];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl FileKind {
    /// Fixed mimetype mapping; anything unrecognized is Other.
    pub fn from_mimetype(mimetype: &str) -> Self {
        if mimetype.starts_with("image/") {
            return FileKind::Image;
        }
        if mimetype.starts_with("video/") {
            return FileKind::Video;
        }
        if mimetype.starts_with("audio/") {
            return FileKind::Audio;
        }
        if mimetype.starts_with("text/")
            || mimetype == "application/pdf"
            || mimetype == "application/msword"
            || mimetype.starts_with("application/vnd.openxmlformats-officedocument")
            || mimetype.starts_with("application/vnd.ms-")
        {
            return FileKind::Document;
        }
        if mimetype == "application/zip"
            || mimetype == "application/gzip"
            || mimetype == "application/x-tar"
            || mimetype == "application/x-7z-compressed"
            || mimetype == "application/x-rar-compressed"
        {
            return FileKind::Archive;
        }
        FileKind::Other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
            FileKind::Archive => "archive",
            FileKind::Other => "other",
        }
    }
}

/// Context a file arrived in: which message referenced it, resolved to
/// archive ids.
#[derive(Debug, Default)]
pub struct FileOrigin {
    pub user_id: Option<i32>,
    pub channel_id: Option<String>,
    pub message_ts: Option<String>,
}

pub struct FileIngestion {
    root: PathBuf,
}

impl FileIngestion {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn files_dir(&self, workspace_id: &str) -> PathBuf {
        self.root.join(workspace_id).join("files")
    }

    /// Ingest one attachment. Returns true when the file's bytes were stored
    /// by this call; false when it was skipped (already known, no force) or
    /// recorded as missing.
    pub async fn ingest(
        &self,
        client: &SlackClient,
        conn: &mut StoreConnection,
        workspace_id: &str,
        token: &str,
        file: &FileObject,
        origin: FileOrigin,
        force: bool,
    ) -> Result<bool> {
        if !force && operations::find_file_by_slack_id(conn, &file.id)?.is_some() {
            debug!(file_id = %file.id, "file already archived, skipping");
            return Ok(false);
        }

        let kind = FileKind::from_mimetype(&file.mimetype);
        let now = Utc::now().naive_utc();

        let mut record = NewFile {
            slack_file_id: file.id.clone(),
            workspace_id: workspace_id.to_string(),
            name: file.name.clone(),
            title: file.title.clone(),
            mimetype: file.mimetype.clone(),
            file_type: kind.as_str().to_string(),
            size: file.size as i64,
            url_private: file.url_private.clone(),
            url_public: file.permalink_public.clone(),
            storage_path: None,
            thumbnails: "{}".to_string(),
            is_public: file.is_public.unwrap_or(false),
            user_id: origin.user_id,
            channel_id: origin.channel_id,
            message_ts: origin.message_ts,
            status: "missing".to_string(),
            created_at: now,
            updated_at: now,
        };

        let Some(url) = file.url_private.as_deref() else {
            warn!(file_id = %file.id, "file has no private URL, recording as missing");
            operations::upsert_file(conn, &record)?;
            return Ok(false);
        };

        let bytes = match client.download(url, token).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(file_id = %file.id, %err, "file download failed, recording as missing");
                operations::upsert_file(conn, &record)?;
                return Ok(false);
            }
        };

        let dir = self.files_dir(workspace_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(storage_name(&file.id, &file.name));
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if kind == FileKind::Image {
            record.thumbnails =
                serde_json::to_string(&self.make_thumbnails(&dir, &file.id, &bytes))?;
        }

        record.storage_path = Some(path.display().to_string());
        record.status = "stored".to_string();
        operations::upsert_file(conn, &record)?;
        debug!(file_id = %file.id, path = %path.display(), "file archived");
        Ok(true)
    }

    /// Derives JPEG thumbnails at the fixed sizes. Each size fails
    /// independently; a corrupt source just yields an empty map.
    fn make_thumbnails(&self, dir: &Path, file_id: &str, bytes: &[u8]) -> BTreeMap<u32, String> {
        let mut paths = BTreeMap::new();
        let source = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(err) => {
                warn!(file_id, %err, "image undecodable, skipping thumbnails");
                return paths;
            }
        };

        let thumbs_dir = dir.join("thumbs");
        if let Err(err) = std::fs::create_dir_all(&thumbs_dir) {
            warn!(file_id, %err, "cannot create thumbnail directory");
            return paths;
        }

        for size in THUMB_SIZES {
            let path = thumbs_dir.join(format!("{file_id}_{size}.jpg"));
            let thumb = source.thumbnail(size, size);
            match thumb.to_rgb8().save_with_format(&path, ImageFormat::Jpeg) {
                Ok(()) => {
                    paths.insert(size, path.display().to_string());
                }
                Err(err) => warn!(file_id, size, %err, "thumbnail write failed"),
            }
        }
        paths
    }
}

/// Slack file names are user-controlled; keep the id as prefix and strip path
/// separators.
fn storage_name(file_id: &str, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if safe.is_empty() {
        file_id.to_string()
    } else {
        format!("{file_id}_{safe}")
    }
}
