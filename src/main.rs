use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use multitalk_runner::{run_job, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "multitalk-runner")]
#[command(about = "Backend wrapper for MultiTalk avatar video generation")]
struct Args {
    /// Идентификатор задания (ключ рабочей директории)
    #[arg(long)]
    job_id: String,

    /// Путь к итоговому видеофайлу (расширение отбрасывается)
    #[arg(long)]
    output: PathBuf,

    /// Путь к JSON-файлу с данными задания
    #[arg(long)]
    data: PathBuf,

    /// Переопределение рабочей директории задания
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Путь к файлу конфигурации
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализируем логгер до любой работы
    multitalk_runner::utils::logger::init_logger();

    let args = Args::parse();
    let config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    run_job(
        &config,
        &args.job_id,
        &args.output,
        &args.data,
        args.work_dir.as_deref(),
    )
    .await
    .with_context(|| format!("job {} failed", args.job_id))?;

    Ok(())
}
