//! Рабочая директория для промежуточных файлов конвейера
//!
//! Озвучка сегментов, субтитры и промежуточные дорожки живут здесь, пока
//! идет сборка.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;

use crate::error::Result;

/// Менеджер временных файлов
pub struct TempFileManager {
    dir: PathBuf,
    /// Без очистки директория остается на диске
    _guard: Option<TempDir>,
    files: Vec<PathBuf>,
    /// Нужно ли удалять файлы при завершении
    cleanup: bool,
}

impl TempFileManager {
    pub fn new(cleanup: bool) -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("narration_").tempdir()?;
        debug!("Temporary directory: {}", temp_dir.path().display());

        let (dir, guard) = if cleanup {
            (temp_dir.path().to_path_buf(), Some(temp_dir))
        } else {
            (temp_dir.keep(), None)
        };

        Ok(Self {
            dir,
            _guard: guard,
            files: Vec::new(),
            cleanup,
        })
    }

    /// Зарезервировать уникальный путь (файл не создается)
    pub fn reserve_path(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let file_name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4(), extension);
        let file_path = self.dir.join(file_name);
        self.files.push(file_path.clone());
        file_path
    }

    /// Записать байты в новый временный файл
    pub fn write_file(&mut self, prefix: &str, extension: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.reserve_path(prefix, extension);
        fs::write(&path, data)?;
        Ok(path)
    }

    pub fn temp_dir_path(&self) -> &Path {
        &self.dir
    }

    /// Удалить созданные файлы, если включена очистка
    pub fn cleanup(&mut self) -> Result<()> {
        if self.cleanup {
            for file in &self.files {
                if file.exists() {
                    fs::remove_file(file)?;
                }
            }
            self.files.clear();
        }
        Ok(())
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
