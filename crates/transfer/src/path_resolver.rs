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

//! Confines caller-supplied relative paths to the storage root.

use std::path::{Component, Path, PathBuf};

use snafu::ensure;

use crate::error::{RejectedSnafu, Result};

/// Resolve `relative` beneath `root`.
///
/// Lexical checks run first, so traversal attempts are refused without
/// touching the filesystem. When the target exists it is canonicalized and
/// must still sit under the canonical root, which catches symlinks pointing
/// outside. A missing target is returned joined but not canonicalized; the
/// caller reports it at stat time.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let reject = |reason: &str| {
        RejectedSnafu {
            path:   relative,
            reason: reason.to_string(),
        }
        .fail()
    };

    ensure!(
        !relative.is_empty(),
        RejectedSnafu {
            path:   relative,
            reason: "empty path",
        }
    );
    ensure!(
        !relative.contains('\0'),
        RejectedSnafu {
            path:   relative,
            reason: "path contains NUL",
        }
    );

    let mut joined = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir => return reject("parent directory component"),
            Component::RootDir | Component::Prefix(_) => return reject("absolute path"),
        }
    }
    if joined.as_path() == root {
        return reject("path names the storage root");
    }

    let Ok(canonical) = joined.canonicalize() else {
        return Ok(joined);
    };
    let Ok(canonical_root) = root.canonicalize() else {
        return Ok(joined);
    };
    if !canonical.starts_with(&canonical_root) {
        tracing::warn!(path = relative, "symlink escapes the storage root");
        return reject("resolves outside the storage root");
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::error::{ErrorKind, TransferError};

    #[test_case("../../etc/passwd" ; "parent traversal")]
    #[test_case("a/../../b" ; "embedded traversal")]
    #[test_case("/etc/passwd" ; "absolute")]
    #[test_case("" ; "empty")]
    #[test_case("a\0b" ; "nul byte")]
    #[test_case("./." ; "root itself")]
    fn test_rejected(relative: &str) {
        // The root does not exist: rejection must not depend on the filesystem.
        let err = resolve(Path::new("/nonexistent/panserve-root"), relative).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[test]
    fn test_resolves_existing_file() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("7")).unwrap();
        std::fs::write(root.path().join("7/report.pdf"), b"pdf").unwrap();

        let resolved = resolve(root.path(), "./7/report.pdf").unwrap();
        assert_eq!(resolved, root.path().canonicalize().unwrap().join("7/report.pdf"));
    }

    #[test]
    fn test_missing_file_is_not_rejected() {
        let root = TempDir::new().unwrap();
        let resolved = resolve(root.path(), "7/missing.bin").unwrap();
        assert_eq!(resolved, root.path().join("7/missing.bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), root.path().join("link"))
            .unwrap();

        let err = resolve(root.path(), "link").unwrap_err();
        assert!(matches!(err, TransferError::Rejected { .. }));
    }
}
