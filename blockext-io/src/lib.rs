use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use blockext_core::document::Document;
use thiserror::Error;
use tracing::debug;

const JSON_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to access file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document snapshot {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported document format {path:?}")]
    UnsupportedExtension { path: PathBuf },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub trait DocumentSaver {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError>;
}

/// 以 JSON 快照读写文档，只接受 `.json` 扩展名。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFacade {
    pretty: bool,
}

impl JsonFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写出带缩进的 JSON，便于人工比对。
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn check_extension(path: &Path) -> Result<(), IoError> {
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(JSON_EXTENSION));
        if supported {
            Ok(())
        } else {
            Err(IoError::UnsupportedExtension {
                path: path.to_path_buf(),
            })
        }
    }
}

impl DocumentLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        Self::check_extension(path)?;
        let file = fs::File::open(path).map_err(|source| IoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Document =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| IoError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            path = %path.display(),
            entities = document.entities().count(),
            blocks = document.blocks().count(),
            "已读取文档"
        );
        Ok(document)
    }
}

impl DocumentSaver for JsonFacade {
    fn save(&self, document: &Document, path: &Path) -> Result<(), IoError> {
        Self::check_extension(path)?;
        let file = fs::File::create(path).map_err(|source| IoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let result = if self.pretty {
            serde_json::to_writer_pretty(&mut writer, document)
        } else {
            serde_json::to_writer(&mut writer, document)
        };
        result.map_err(|source| IoError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|source| IoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "已写出文档");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(JsonFacade::check_extension(Path::new("a/b.JSON")).is_ok());
        assert!(JsonFacade::check_extension(Path::new("a/b.json")).is_ok());
        assert!(matches!(
            JsonFacade::check_extension(Path::new("a/b.dxf")),
            Err(IoError::UnsupportedExtension { .. })
        ));
        assert!(JsonFacade::check_extension(Path::new("a/json")).is_err());
    }
}
