// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use snafu::ensure;

use crate::{
    error::{RejectedSnafu, Result},
    path_resolver,
    session::FileKind,
};

const MEDIA_EXTENSIONS: &[&str] = &[
    "aac", "flac", "m4a", "mp3", "ogg", "opus", "wav", "avi", "m4v", "mkv", "mov", "mp4", "webm",
];

/// A file a user may mint a download code for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub relative_path: String,
    pub display_name:  String,
    pub kind:          FileKind,
    pub is_dir:        bool,
}

/// Ownership lookup consulted before a download code is issued.
#[async_trait]
pub trait FileCatalog: Send + Sync {
    /// `None` when the file does not exist or `user_id` may not read it.
    async fn lookup(&self, file_id: &str, user_id: &str) -> Result<Option<FileRecord>>;
}

/// Treats `<root>/<user_id>/` as the caller's home and `file_id` as a path
/// inside it.
#[derive(Debug, Clone)]
pub struct HomeDirCatalog {
    root: PathBuf,
}

impl HomeDirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }
}

/// Media by extension, case-insensitive.
#[must_use]
pub fn kind_for_name(name: &str) -> FileKind {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
        .map_or(FileKind::Plain, |_| FileKind::Media)
}

#[async_trait]
impl FileCatalog for HomeDirCatalog {
    async fn lookup(&self, file_id: &str, user_id: &str) -> Result<Option<FileRecord>> {
        ensure!(
            !user_id.is_empty()
                && user_id != "."
                && user_id != ".."
                && !user_id.contains(['/', '\\']),
            RejectedSnafu {
                path:   user_id,
                reason: "user id is not a single path component",
            }
        );

        let relative_path = format!("{user_id}/{}", file_id.trim_start_matches('/'));
        let absolute = path_resolver::resolve(&self.root, &relative_path)?;

        let Ok(metadata) = tokio::fs::metadata(&absolute).await else {
            return Ok(None);
        };
        let display_name = absolute
            .file_name()
            .map_or_else(|| file_id.to_string(), |name| name.to_string_lossy().into_owned());

        Ok(Some(FileRecord {
            kind: kind_for_name(&display_name),
            relative_path,
            display_name,
            is_dir: metadata.is_dir(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_kind_for_name() {
        assert_eq!(kind_for_name("song.MP3"), FileKind::Media);
        assert_eq!(kind_for_name("clip.webm"), FileKind::Media);
        assert_eq!(kind_for_name("report.pdf"), FileKind::Plain);
        assert_eq!(kind_for_name("README"), FileKind::Plain);
    }

    #[tokio::test]
    async fn test_lookup_in_home_dir() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("alice/music")).unwrap();
        std::fs::write(root.path().join("alice/music/track.flac"), b"fLaC").unwrap();

        let catalog = HomeDirCatalog::new(root.path());
        let record = catalog
            .lookup("music/track.flac", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.relative_path, "alice/music/track.flac");
        assert_eq!(record.display_name, "track.flac");
        assert_eq!(record.kind, FileKind::Media);
        assert!(!record.is_dir);

        let dir = catalog.lookup("music", "alice").await.unwrap().unwrap();
        assert!(dir.is_dir);
    }

    #[tokio::test]
    async fn test_other_users_files_are_invisible() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("alice")).unwrap();
        std::fs::write(root.path().join("alice/a.txt"), b"a").unwrap();

        let catalog = HomeDirCatalog::new(root.path());
        assert!(catalog.lookup("a.txt", "bob").await.unwrap().is_none());

        let err = catalog.lookup("../alice/a.txt", "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let err = catalog.lookup("a.txt", "..").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }
}
