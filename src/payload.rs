//! Сборка входного документа генератора
//!
//! Три взаимоисключающие стратегии построения, выбираемые по
//! [`AvatarSource`](crate::job::AvatarSource): базовый шаблон со скачанным
//! изображением, слияние с конфигом из локальной директории аватара и
//! прямое построение из явных полей задания. Единое предусловие всех
//! стратегий: непустой `speech_text`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::assets::{AssetResolver, AvatarAssets};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::job::JobRecord;
use crate::utils::common::resolve_path;

/// Промпт по умолчанию для шаблонной стратегии
const TEMPLATE_PROMPT: &str = "A person is talking naturally, facing the camera";

/// Входной документ генератора.
///
/// После сборки гарантированно содержит `cond_image`, `cond_audio`
/// (возможно пустой объект), `tts_audio.text` и `tts_audio.human1_voice`.
/// Записывается в файл один раз и после этого не изменяется.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Значение поля верхнего уровня
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Документ в виде JSON-значения
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Сборщик входного документа
pub struct PayloadBuilder<'a> {
    config: &'a AppConfig,
    resolver: &'a AssetResolver<'a>,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(config: &'a AppConfig, resolver: &'a AssetResolver<'a>) -> Self {
        PayloadBuilder { config, resolver }
    }

    /// Шаблонная стратегия: базовый документ + скачанное изображение.
    pub fn build_template(&self, record: &JobRecord, image_path: &Path) -> Result<Payload> {
        let speech_text = record.speech_text()?;

        let mut payload = Map::new();
        payload.insert(
            "prompt".to_string(),
            Value::String(TEMPLATE_PROMPT.to_string()),
        );
        payload.insert(
            "cond_image".to_string(),
            path_value(&self.config.repo_dir, image_path),
        );
        payload.insert("cond_audio".to_string(), Value::Object(Map::new()));

        let voice = self
            .resolver
            .resolve_voice(record.preferred_voice.as_deref());
        let mut tts_audio = Map::new();
        tts_audio.insert("text".to_string(), Value::String(speech_text.to_string()));
        tts_audio.insert(
            "human1_voice".to_string(),
            Value::String(voice.to_string_lossy().into_owned()),
        );
        payload.insert("tts_audio".to_string(), Value::Object(tts_audio));

        finish(payload)
    }

    /// Стратегия слияния: конфиг из директории аватара + блок tts_audio задания.
    pub fn build_from_avatar_dir(
        &self,
        record: &JobRecord,
        assets: &AvatarAssets,
    ) -> Result<Payload> {
        let speech_text = record.speech_text()?;

        let text = std::fs::read_to_string(&assets.config_path).map_err(|e| {
            AppError::input(format!(
                "failed to read avatar config {}: {}",
                assets.config_path.display(),
                e
            ))
        })?;
        let document: Value = serde_json::from_str(&text).map_err(|e| {
            AppError::input(format!(
                "failed to parse avatar config {}: {}",
                assets.config_path.display(),
                e
            ))
        })?;
        let mut payload = match document {
            Value::Object(map) => map,
            _ => {
                return Err(AppError::input(format!(
                    "avatar config {} must be a JSON object",
                    assets.config_path.display()
                )))
            }
        };

        payload.insert(
            "cond_image".to_string(),
            path_value(&self.config.repo_dir, &assets.image_path),
        );
        if !payload.contains_key("cond_audio") {
            payload.insert("cond_audio".to_string(), Value::Object(Map::new()));
        }

        // Блок tts_audio задания сохраняет свои дополнительные поля
        let mut tts_audio = record.tts_audio.clone().unwrap_or_default();
        tts_audio.insert("text".to_string(), Value::String(speech_text.to_string()));

        let human1 = match tts_audio.get("human1_voice") {
            Some(Value::String(voice)) if !voice.is_empty() => {
                self.resolver.resolve_voice(Some(voice))
            }
            _ => self
                .resolver
                .resolve_voice(record.preferred_voice.as_deref()),
        };
        tts_audio.insert(
            "human1_voice".to_string(),
            Value::String(human1.to_string_lossy().into_owned()),
        );

        if let Some(Value::String(voice)) = tts_audio.get("human2_voice") {
            if !voice.is_empty() {
                let human2 = self.resolver.resolve_voice(Some(voice));
                tts_audio.insert(
                    "human2_voice".to_string(),
                    Value::String(human2.to_string_lossy().into_owned()),
                );
            }
        }

        payload.insert("tts_audio".to_string(), Value::Object(tts_audio));

        finish(payload)
    }

    /// Явная стратегия: все четыре поля задания обязательны.
    pub fn build_explicit(&self, record: &JobRecord) -> Result<Payload> {
        let speech_text = record.speech_text()?;
        let video_prompt = required_field(record.video_prompt.as_deref(), "video_prompt")?;
        let kokoro_voice = required_field(record.kokoro_voice.as_deref(), "kokoro_voice")?;
        let avatar_path = required_field(record.avatar_path.as_deref(), "avatar_path")?;

        let mut payload = Map::new();
        payload.insert(
            "prompt".to_string(),
            Value::String(video_prompt.to_string()),
        );
        payload.insert(
            "cond_image".to_string(),
            path_value(&self.config.repo_dir, Path::new(avatar_path)),
        );
        payload.insert("cond_audio".to_string(), Value::Object(Map::new()));

        let voice = self.resolver.resolve_voice(Some(kokoro_voice));
        let mut tts_audio = Map::new();
        tts_audio.insert("text".to_string(), Value::String(speech_text.to_string()));
        tts_audio.insert(
            "human1_voice".to_string(),
            Value::String(voice.to_string_lossy().into_owned()),
        );
        payload.insert("tts_audio".to_string(), Value::Object(tts_audio));

        finish(payload)
    }
}

fn required_field<'v>(value: Option<&'v str>, field: &'static str) -> Result<&'v str> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::MissingField { field }),
    }
}

fn path_value(base: &Path, path: &Path) -> Value {
    Value::String(resolve_path(base, path).to_string_lossy().into_owned())
}

/// Проверка инвариантов собранного документа
fn finish(payload: Map<String, Value>) -> Result<Payload> {
    match payload.get("cond_image") {
        Some(Value::String(image)) if !image.is_empty() => {}
        _ => return Err(AppError::input("payload is missing cond_image")),
    }
    match payload.get("cond_audio") {
        Some(Value::Object(_)) => {}
        _ => return Err(AppError::input("payload cond_audio must be a mapping")),
    }
    match payload.get("tts_audio") {
        Some(Value::Object(tts_audio)) => {
            match tts_audio.get("text") {
                Some(Value::String(text)) if !text.is_empty() => {}
                _ => return Err(AppError::input("payload tts_audio.text must be non-empty")),
            }
            match tts_audio.get("human1_voice") {
                Some(Value::String(voice)) if !voice.is_empty() => {}
                _ => {
                    return Err(AppError::input(
                        "payload tts_audio.human1_voice must be non-empty",
                    ))
                }
            }
        }
        _ => return Err(AppError::input("payload is missing tts_audio")),
    }
    Ok(Payload(payload))
}
