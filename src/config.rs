//! Конфигурация обёртки
//!
//! Все директории и значения по умолчанию передаются компонентам явно,
//! без глобального состояния. Относительные пути трактуются относительно
//! директории репозитория генератора (`repo_dir`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Конфигурация запуска генератора
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Директория репозитория MultiTalk (база для относительных путей)
    pub repo_dir: PathBuf,

    /// Директория с ассетами аватара по умолчанию (json + изображение)
    pub avatar_dir: PathBuf,

    /// Директория чекпойнтов генератора
    pub ckpt_dir: PathBuf,

    /// Директория модели wav2vec
    pub wav2vec_dir: PathBuf,

    /// Директория весов Kokoro
    pub kokoro_dir: PathBuf,

    /// Голос TTS по умолчанию
    pub tts_voice: PathBuf,

    /// Количество шагов сэмплирования по умолчанию
    pub sample_steps: u32,

    /// Корневая директория рабочих директорий заданий
    pub runs_root: PathBuf,

    /// Явный путь к интерпретатору python (иначе поиск в PATH)
    pub python: Option<PathBuf>,

    /// Таймаут скачивания аватара, секунды
    pub download_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            repo_dir: PathBuf::from("."),
            avatar_dir: PathBuf::from("./inputs/avatar"),
            ckpt_dir: PathBuf::from("./weights/Wan2.1-I2V-14B-480P"),
            wav2vec_dir: PathBuf::from("./weights/chinese-wav2vec2-base"),
            kokoro_dir: PathBuf::from("./weights/Kokoro-82M"),
            tts_voice: PathBuf::from("./weights/Kokoro-82M/voices/af_heart.pt"),
            sample_steps: 30,
            runs_root: PathBuf::from("./backend_runs"),
            python: None,
            download_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Загрузить конфигурацию из JSON-файла или взять значения по умолчанию
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AppError::input(format!(
                        "failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_str(&text).map_err(|e| {
                    AppError::input(format!(
                        "failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            None => Ok(AppConfig::default()),
        }
    }

    /// Проверка обязательных настроек перед запуском
    pub fn validate(&self) -> Result<()> {
        if self.ckpt_dir.as_os_str().is_empty() {
            return Err(AppError::input("ckpt_dir is not configured"));
        }
        if self.wav2vec_dir.as_os_str().is_empty() {
            return Err(AppError::input("wav2vec_dir is not configured"));
        }
        Ok(())
    }

    /// Путь к скрипту генератора внутри репозитория
    pub fn generator_script(&self) -> PathBuf {
        self.repo_dir.join("generate_multitalk.py")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sample_steps, 30);
        assert_eq!(config.download_timeout_secs, 60);
        assert!(config.python.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sample_steps": 12, "repo_dir": "/opt/multitalk"}}"#).unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.sample_steps, 12);
        assert_eq!(config.repo_dir, PathBuf::from("/opt/multitalk"));
        // Остальные поля берутся из значений по умолчанию
        assert_eq!(config.download_timeout_secs, 60);
    }

    #[test]
    fn test_validate_rejects_empty_dirs() {
        let mut config = AppConfig::default();
        config.ckpt_dir = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.wav2vec_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
