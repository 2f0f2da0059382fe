use std::path::{Path, PathBuf};

/// Trait representing repository storage that can resolve repository paths.
pub trait RepositoryProvider {
    fn ensure_local_repository(&self, segments: &[String]) -> anyhow::Result<PathBuf>;
}

/// Repositories laid out as `<root>/<group>/<repo>` directories.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryStorage { root: root.into() }
    }
}

impl RepositoryProvider for DirectoryStorage {
    fn ensure_local_repository(&self, segments: &[String]) -> anyhow::Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in segments {
            path.push(segment);
        }

        if path.is_dir() {
            Ok(path)
        } else {
            Err(anyhow::anyhow!("repository directory not found at {}", path.display()))
        }
    }
}

pub fn resolve_repo_dir<P>(storage: &P, segments: &[String]) -> anyhow::Result<PathBuf>
where
    P: RepositoryProvider,
{
    // Accept repo or repo.git directory structure. Try exact first, then with .git suffix.
    match storage.ensure_local_repository(segments) {
        Ok(p) => Ok(p),
        Err(_) => {
            if let Some((last, head)) = segments.split_last() {
                let mut alt = head.to_vec();
                alt.push(format!("{last}.git"));
                storage.ensure_local_repository(&alt)
            } else {
                anyhow::bail!("invalid repository path")
            }
        }
    }
}

/// Honors the git-daemon-export-ok convention unless everything is exported.
pub fn is_public_repo(dir: &Path, export_all: bool) -> bool {
    export_all || dir.join("git-daemon-export-ok").exists()
}

pub fn validate_slug(slug: &str) -> anyhow::Result<()> {
    let is_valid = !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if is_valid {
        Ok(())
    } else {
        anyhow::bail!("slug must be lowercase kebab-case: {slug:?}")
    }
}

/// Strips an optional `.git` suffix from each URL segment and validates it.
pub fn normalize_segments(mut segments: Vec<String>) -> anyhow::Result<Vec<String>> {
    for s in &mut segments {
        if let Some(stripped) = s.strip_suffix(".git") {
            *s = stripped.to_string();
        }
        validate_slug(s)?;
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn slug_rules() {
        assert!(validate_slug("tools").is_ok());
        assert!(validate_slug("my-repo-2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("-lead").is_err());
        assert!(validate_slug("trail-").is_err());
        assert!(validate_slug("double--dash").is_err());
        assert!(validate_slug("Upper").is_err());
        assert!(validate_slug("..").is_err());
    }

    #[test]
    fn normalize_strips_git_suffix() {
        let segments = normalize_segments(vec!["team".into(), "tools.git".into()]).unwrap();
        assert_eq!(segments, ["team", "tools"]);
        assert!(normalize_segments(vec!["../etc".into()]).is_err());
    }

    #[test]
    fn resolve_falls_back_to_dot_git_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("team/plain")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("team/bare.git")).unwrap();
        let storage = DirectoryStorage::new(temp_dir.path());

        let plain = resolve_repo_dir(&storage, &["team".into(), "plain".into()]).unwrap();
        assert!(plain.ends_with("team/plain"));
        let bare = resolve_repo_dir(&storage, &["team".into(), "bare".into()]).unwrap();
        assert!(bare.ends_with("team/bare.git"));
        assert!(resolve_repo_dir(&storage, &["team".into(), "missing".into()]).is_err());
    }

    #[test]
    fn export_marker_gates_access() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_public_repo(temp_dir.path(), false));
        assert!(is_public_repo(temp_dir.path(), true));
        std::fs::write(temp_dir.path().join("git-daemon-export-ok"), b"").unwrap();
        assert!(is_public_repo(temp_dir.path(), false));
    }
}
