//! # MultiTalk launch wrapper
//!
//! Обёртка для запуска генерации говорящего аватара через MultiTalk.
//! Библиотека выполняет следующие задачи:
//! 1. Загрузка записи задания от бэкенда и классификация способа выбора аватара.
//! 2. Разрешение ассетов: сканирование директории аватара, скачивание
//!    изображения по подписанному URL, разворачивание идентификаторов голосов.
//! 3. Сборка входного JSON-документа генератора по одной из трёх стратегий.
//! 4. Планирование бюджета кадров по длине текста озвучки.
//! 5. Запуск генератора с потоковой трансляцией вывода и хвостовым буфером
//!    для диагностики сбоев.
//! 6. Гарантированная очистка рабочей директории задания на любом исходе.
//!
//! **Замечание:** генератор MultiTalk запускается как внешний процесс и
//! должен быть установлен отдельно вместе со своими весами.

use log::{info, warn};
use std::path::Path;

pub mod assets;
pub mod config;
pub mod error;
pub mod frames;
pub mod job;
pub mod payload;
pub mod runner;
pub mod utils;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use frames::FrameBudget;
pub use job::{AvatarSource, JobRecord, Mode};
pub use payload::Payload;

use assets::AssetResolver;
use payload::PayloadBuilder;
use runner::JobRunner;
use utils::common::resolve_path;

/// Выполнить одно задание генерации от начала до конца.
///
/// Последовательность: загрузка записи задания, разрешение ассетов, сборка
/// и сохранение документа, планирование кадров, запуск генератора. Рабочая
/// директория задания удаляется на любом исходе; сбой удаления не фатален.
pub async fn run_job(
    config: &AppConfig,
    job_id: &str,
    output: &Path,
    data_path: &Path,
    work_dir_override: Option<&Path>,
) -> Result<()> {
    config.validate()?;

    let record = JobRecord::load(data_path)?;
    let resolver = AssetResolver::new(config);
    let runner = JobRunner::new(config);

    let work_dir = runner.prepare_work_dir(job_id, work_dir_override)?;
    info!("Starting job {} in {}", job_id, work_dir.display());

    let result = execute(config, &resolver, &runner, &record, &work_dir, output).await;

    if let Err(e) = runner.cleanup_work_dir(&work_dir) {
        warn!(
            "Failed to remove work directory {}: {}",
            work_dir.display(),
            e
        );
    }

    result
}

async fn execute(
    config: &AppConfig,
    resolver: &AssetResolver<'_>,
    runner: &JobRunner<'_>,
    record: &JobRecord,
    work_dir: &Path,
    output: &Path,
) -> Result<()> {
    let builder = PayloadBuilder::new(config, resolver);

    let payload = match record.avatar_source() {
        AvatarSource::SignedUrlTemplate => {
            let url = record.avatar_url.as_deref().ok_or(AppError::MissingField {
                field: "avatar_url",
            })?;
            let image_path = resolver.download_avatar(url, work_dir).await?;
            builder.build_template(record, &image_path)?
        }
        AvatarSource::LocalDirectory => {
            let avatar_dir = resolve_path(&config.repo_dir, &config.avatar_dir);
            let assets = resolver.select_avatar_assets(&avatar_dir)?;
            builder.build_from_avatar_dir(record, &assets)?
        }
        AvatarSource::ExplicitFields => builder.build_explicit(record)?,
    };

    let speech_text = record.speech_text()?;
    let budget = frames::plan(speech_text, record.mode);
    if let Some(duration) = frames::estimate_duration(speech_text) {
        info!(
            "Estimated speech duration {:.1}s, frame budget {}..{}",
            duration, budget.frame_num, budget.max_frames_num
        );
    }

    runner.run(work_dir, output, record, &payload, &budget).await
}
