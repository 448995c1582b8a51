use std::path::{Path, PathBuf};

/// Maps a logical model name to a file on disk.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, logical_name: &str) -> Option<PathBuf>;
}

/// Resolves assets relative to a data directory.
#[derive(Debug, Clone)]
pub struct DirAssetResolver {
    root: PathBuf,
}

impl DirAssetResolver {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetResolver for DirAssetResolver {
    fn resolve(&self, logical_name: &str) -> Option<PathBuf> {
        let path = self.root.join(logical_name);
        if path.is_file() {
            Some(path)
        } else {
            tracing::error!(
                "Unable to get model filename {} from {}",
                logical_name,
                self.root.display()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/selfie.onnx"), b"onnx").unwrap();

        let resolver = DirAssetResolver::new(dir.path());
        assert_eq!(
            resolver.resolve("models/selfie.onnx"),
            Some(dir.path().join("models/selfie.onnx"))
        );
        assert_eq!(resolver.resolve("models/missing.onnx"), None);
        assert_eq!(resolver.resolve("models"), None);
    }
}
