//! Модель данных задания
//!
//! Запись задания приходит от бэкенда в виде JSON-файла и после загрузки
//! не изменяется. Способ выбора аватара определяется классификатором
//! [`JobRecord::avatar_source`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{AppError, Result};

/// Режим генерации
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Потоковый режим: длина ограничена потолком `max_frames_num`
    Streaming,
    /// Клип фиксированной длины `frame_num`
    Clip,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Streaming
    }
}

impl Mode {
    /// Получить строковое представление режима
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Streaming => "streaming",
            Mode::Clip => "clip",
        }
    }
}

/// Способ получения аватара, выбранный для задания
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarSource {
    /// Сканирование настроенной локальной директории с ассетами
    LocalDirectory,
    /// Скачивание изображения по подписанному URL поверх базового шаблона
    SignedUrlTemplate,
    /// Явные поля задания (`avatar_path`, `kokoro_voice`, `video_prompt`)
    ExplicitFields,
}

/// Запись задания от бэкенда
#[derive(Debug, Clone, Deserialize)]
pub struct JobRecord {
    /// Текст, который генератор озвучит через TTS
    #[serde(default)]
    pub speech_text: Option<String>,

    /// Режим генерации (по умолчанию потоковый)
    #[serde(default)]
    pub mode: Mode,

    /// Количество шагов сэмплирования (иначе значение из конфигурации)
    #[serde(default)]
    pub sample_steps: Option<u32>,

    #[serde(default)]
    pub num_persistent_param_in_dit: Option<u64>,

    /// Ускорение через teacache (по умолчанию включено)
    #[serde(default)]
    pub use_teacache: Option<bool>,

    /// Подписанный URL изображения аватара
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// Предпочтительный голос (переопределяет голос по умолчанию)
    #[serde(default)]
    pub preferred_voice: Option<String>,

    /// Явный путь к изображению аватара
    #[serde(default)]
    pub avatar_path: Option<String>,

    /// Голос Kokoro для явного варианта
    #[serde(default)]
    pub kokoro_voice: Option<String>,

    /// Текстовый промпт видео для явного варианта
    #[serde(default)]
    pub video_prompt: Option<String>,

    /// Блок tts_audio, переданный вызывающей стороной
    #[serde(default)]
    pub tts_audio: Option<Map<String, Value>>,
}

impl JobRecord {
    /// Загрузить запись задания из JSON-файла
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::input(format!("failed to read job data {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            AppError::input(format!("failed to parse job data {}: {}", path.display(), e))
        })
    }

    /// Непустой текст озвучки или ошибка
    pub fn speech_text(&self) -> Result<&str> {
        match self.speech_text.as_deref() {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(AppError::MissingField {
                field: "speech_text",
            }),
        }
    }

    /// Классификация способа получения аватара.
    ///
    /// Правило тотально и не зависит от порядка полей: `avatar_url`
    /// выигрывает у явных полей, а явные поля (`avatar_path`,
    /// `kokoro_voice` или `video_prompt`) выигрывают у локальной
    /// директории по умолчанию.
    pub fn avatar_source(&self) -> AvatarSource {
        if self.avatar_url.is_some() {
            AvatarSource::SignedUrlTemplate
        } else if self.avatar_path.is_some()
            || self.kokoro_voice.is_some()
            || self.video_prompt.is_some()
        {
            AvatarSource::ExplicitFields
        } else {
            AvatarSource::LocalDirectory
        }
    }

    /// Включено ли ускорение teacache
    pub fn use_teacache(&self) -> bool {
        self.use_teacache.unwrap_or(true)
    }
}
