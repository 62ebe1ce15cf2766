//! Модуль обработки ошибок обёртки
//!
//! Закрытый набор ошибок конвейера: некорректные входные данные,
//! сетевые сбои при загрузке ассетов и ненулевое завершение генератора.

use thiserror::Error;

/// Ошибки конвейера запуска генерации
#[derive(Debug, Error)]
pub enum AppError {
    /// Некорректные входные данные задания или ассетов
    #[error("invalid input: {reason}")]
    Input { reason: String },

    /// Обязательное поле отсутствует в данных задания
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// Транспортная ошибка при скачивании аватара
    #[error("download failed for {url}: {reason}")]
    Network { url: String, reason: String },

    /// Сервер вернул неуспешный HTTP-статус
    #[error("download failed for {url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Генератор завершился с ненулевым кодом
    #[error("generation failed with exit code {exit_code}. Last output:\n{tail}")]
    Subprocess { exit_code: i32, tail: String },

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Другая ошибка
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Ошибка входных данных с форматируемой причиной
    pub fn input(reason: impl Into<String>) -> Self {
        AppError::Input {
            reason: reason.into(),
        }
    }
}

/// Тип Result для конвейера
pub type Result<T> = std::result::Result<T, AppError>;
