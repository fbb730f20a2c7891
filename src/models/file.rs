use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
    pub user: Option<String>,
    pub url_private: Option<String>,
    pub permalink_public: Option<String>,
    pub is_public: Option<bool>,
    pub channels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<FileObject>,
    pub paging: Option<Paging>,
}

/// files.list still uses classic page-number paging rather than cursors.
#[derive(Debug, Deserialize)]
pub struct Paging {
    pub page: u32,
    pub pages: u32,
}
