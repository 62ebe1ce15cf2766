//! Generator subprocess supervision.
//!
//! Owns the per-job working directory, persists the payload, assembles the
//! generator argument vector and runs the external process while streaming
//! its merged output. The working directory is removed by the caller on
//! every path via [`JobRunner::cleanup_work_dir`].

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::frames::FrameBudget;
use crate::job::{JobRecord, Mode};
use crate::payload::Payload;
use crate::utils::common::resolve_path;

/// How many trailing output lines are kept for failure diagnostics
const TAIL_LINES: usize = 200;

/// Runs the external generator for a single job
pub struct JobRunner<'a> {
    config: &'a AppConfig,
}

impl<'a> JobRunner<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        JobRunner { config }
    }

    /// Create (idempotently) the scoped working directory for a job.
    ///
    /// A caller-supplied override is honored as-is; otherwise the directory
    /// is keyed by job id under the configured runs root.
    pub fn prepare_work_dir(&self, job_id: &str, override_dir: Option<&Path>) -> Result<PathBuf> {
        let work_dir = match override_dir {
            Some(dir) => resolve_path(&self.config.repo_dir, dir),
            None => resolve_path(&self.config.repo_dir, &self.config.runs_root).join(job_id),
        };
        std::fs::create_dir_all(&work_dir)?;
        debug!("Work directory ready: {}", work_dir.display());
        Ok(work_dir)
    }

    /// Persist the payload as a uniquely named JSON file inside the work dir.
    pub fn write_payload(&self, work_dir: &Path, payload: &Payload) -> Result<PathBuf> {
        let file_name = format!("{}.json", Uuid::new_v4().simple());
        let path = work_dir.join(file_name);
        let text = serde_json::to_string(payload)?;
        std::fs::write(&path, text)?;
        debug!("Payload written to {}", path.display());
        Ok(path)
    }

    /// Ensure the Kokoro weights are reachable via `weights/Kokoro-82M`
    /// relative to the generator repo.
    ///
    /// The generator resolves that path relative to its own checkout, so a
    /// symlink to the configured absolute directory is provided. The caller
    /// is permitted to ignore the returned result: when symlinks are not
    /// supported the generator surfaces a clear error downstream.
    pub fn ensure_kokoro_weights(&self) -> std::io::Result<()> {
        if self.config.kokoro_dir.as_os_str().is_empty() {
            return Ok(());
        }
        let kokoro_dir = resolve_path(&self.config.repo_dir, &self.config.kokoro_dir);
        let weights_dir = resolve_path(&self.config.repo_dir, Path::new("weights"));
        std::fs::create_dir_all(&weights_dir)?;

        let link_path = weights_dir.join("Kokoro-82M");
        if link_path.exists() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&kokoro_dir, &link_path)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_dir(&kokoro_dir, &link_path)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = kokoro_dir;
            Ok(())
        }
    }

    /// Assemble the full generator argument vector.
    pub fn build_command(
        &self,
        input_json: &Path,
        audio_save_dir: &Path,
        output: &Path,
        record: &JobRecord,
        budget: &FrameBudget,
    ) -> Result<Vec<String>> {
        let python = self.python_executable()?;
        let script = self.config.generator_script();
        let ckpt_dir = resolve_path(&self.config.repo_dir, &self.config.ckpt_dir);
        let wav2vec_dir = resolve_path(&self.config.repo_dir, &self.config.wav2vec_dir);
        // The generator appends its own extension to the save stem
        let save_stem = output.with_extension("");

        let mut command = vec![
            python.to_string_lossy().into_owned(),
            script.to_string_lossy().into_owned(),
            "--ckpt_dir".to_string(),
            ckpt_dir.to_string_lossy().into_owned(),
            "--wav2vec_dir".to_string(),
            wav2vec_dir.to_string_lossy().into_owned(),
            "--input_json".to_string(),
            input_json.to_string_lossy().into_owned(),
            "--sample_steps".to_string(),
            record
                .sample_steps
                .unwrap_or(self.config.sample_steps)
                .to_string(),
            "--mode".to_string(),
            record.mode.as_str().to_string(),
            "--num_persistent_param_in_dit".to_string(),
            record.num_persistent_param_in_dit.unwrap_or(0).to_string(),
            "--audio_mode".to_string(),
            "tts".to_string(),
            "--audio_save_dir".to_string(),
            audio_save_dir.to_string_lossy().into_owned(),
            "--save_file".to_string(),
            save_stem.to_string_lossy().into_owned(),
            "--frame_num".to_string(),
            budget.frame_num.to_string(),
        ];

        if record.mode == Mode::Streaming {
            command.push("--max_frames_num".to_string());
            command.push(budget.max_frames_num.to_string());
        }

        if record.use_teacache() {
            command.push("--use_teacache".to_string());
        }

        Ok(command)
    }

    /// Persist the payload and run the generator to completion.
    pub async fn run(
        &self,
        work_dir: &Path,
        output: &Path,
        record: &JobRecord,
        payload: &Payload,
        budget: &FrameBudget,
    ) -> Result<()> {
        let input_json = self.write_payload(work_dir, payload)?;
        let audio_save_dir = work_dir.join("audio");

        if let Err(e) = self.ensure_kokoro_weights() {
            warn!("Failed to ensure Kokoro weights link: {}", e);
        }

        let command = self.build_command(&input_json, &audio_save_dir, output, record, budget)?;
        debug!("Generator command: {:?}", command);

        self.stream_process(&command).await
    }

    /// Remove the working directory. Callers treat failure as non-fatal.
    pub fn cleanup_work_dir(&self, work_dir: &Path) -> std::io::Result<()> {
        std::fs::remove_dir_all(work_dir)
    }

    fn python_executable(&self) -> Result<PathBuf> {
        if let Some(python) = &self.config.python {
            return Ok(python.clone());
        }
        which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|e| AppError::input(format!("python interpreter not found in PATH: {}", e)))
    }

    /// Run the command while streaming merged stdout/stderr line-by-line to
    /// our stdout, keeping only the most recent lines for diagnostics.
    async fn stream_process(&self, argv: &[String]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AppError::Other("generator command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.config.repo_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Other("failed to get stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Other("failed to get stderr handle".to_string()))?;

        // Both pipes feed one ordered channel so the tail reflects the
        // merged stream the way the console shows it
        let (tx, mut rx) = mpsc::channel::<String>(256);
        let stdout_task = drain_lines(stdout, tx.clone());
        let stderr_task = drain_lines(stderr, tx);

        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut console = std::io::stdout();
        while let Some(line) = rx.recv().await {
            let _ = writeln!(console, "{}", line);
            let _ = console.flush();

            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        if let Err(e) = stdout_task.await {
            error!("Error in stdout handler: {}", e);
        }
        if let Err(e) = stderr_task.await {
            error!("Error in stderr handler: {}", e);
        }

        let status = child.wait().await?;
        if !status.success() {
            let tail_text = tail.into_iter().collect::<Vec<_>>().join("\n");
            return Err(AppError::Subprocess {
                exit_code: status.code().unwrap_or(-1),
                tail: tail_text,
            });
        }

        info!("Generator process completed successfully");
        Ok(())
    }
}

fn drain_lines<R>(reader: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(trimmed).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Error reading generator output: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetResolver;
    use crate::frames;
    use crate::payload::PayloadBuilder;
    use serde_json::Value;

    fn test_config(repo_dir: &Path) -> AppConfig {
        AppConfig {
            repo_dir: repo_dir.to_path_buf(),
            python: Some(PathBuf::from("/usr/bin/python3")),
            ..AppConfig::default()
        }
    }

    fn explicit_record(mode: &str, teacache: bool) -> JobRecord {
        serde_json::from_str(&format!(
            r#"{{
                "speech_text": "short line of text for the generator",
                "mode": "{}",
                "use_teacache": {},
                "video_prompt": "anchor",
                "kokoro_voice": "af_heart",
                "avatar_path": "inputs/anchor.png"
            }}"#,
            mode, teacache
        ))
        .unwrap()
    }

    #[test]
    fn test_payload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(Path::new("/opt/multitalk"));
        let resolver = AssetResolver::new(&config);
        let builder = PayloadBuilder::new(&config, &resolver);
        let record = explicit_record("clip", true);
        let payload = builder.build_explicit(&record).unwrap();

        let runner = JobRunner::new(&config);
        let path = runner.write_payload(dir.path(), &payload).unwrap();
        assert_eq!(path.extension().unwrap(), "json");

        // Перечитанный документ структурно идентичен записанному
        let text = std::fs::read_to_string(&path).unwrap();
        let reread: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reread, payload.as_value());
    }

    #[test]
    fn test_build_command_streaming() {
        let config = test_config(Path::new("/opt/multitalk"));
        let runner = JobRunner::new(&config);
        let record = explicit_record("streaming", true);
        let budget = frames::plan(record.speech_text().unwrap(), record.mode);

        let command = runner
            .build_command(
                Path::new("/tmp/job/input.json"),
                Path::new("/tmp/job/audio"),
                Path::new("/data/out/result.mp4"),
                &record,
                &budget,
            )
            .unwrap();

        assert_eq!(command[0], "/usr/bin/python3");
        assert_eq!(command[1], "/opt/multitalk/generate_multitalk.py");

        let joined = command.join(" ");
        assert!(joined.contains("--ckpt_dir /opt/multitalk/weights/Wan2.1-I2V-14B-480P"));
        assert!(joined.contains("--wav2vec_dir /opt/multitalk/weights/chinese-wav2vec2-base"));
        assert!(joined.contains("--input_json /tmp/job/input.json"));
        assert!(joined.contains("--sample_steps 30"));
        assert!(joined.contains("--mode streaming"));
        assert!(joined.contains("--audio_mode tts"));
        assert!(joined.contains("--audio_save_dir /tmp/job/audio"));
        // Расширение итогового файла отброшено
        assert!(joined.contains("--save_file /data/out/result"));
        assert!(joined.contains(&format!("--frame_num {}", budget.frame_num)));
        assert!(joined.contains(&format!("--max_frames_num {}", budget.max_frames_num)));
        assert!(joined.contains("--use_teacache"));
    }

    #[test]
    fn test_build_command_clip_without_teacache() {
        let config = test_config(Path::new("/opt/multitalk"));
        let runner = JobRunner::new(&config);
        let record = explicit_record("clip", false);
        let budget = frames::plan(record.speech_text().unwrap(), record.mode);

        let command = runner
            .build_command(
                Path::new("/tmp/job/input.json"),
                Path::new("/tmp/job/audio"),
                Path::new("/data/out/result.mp4"),
                &record,
                &budget,
            )
            .unwrap();

        let joined = command.join(" ");
        assert!(!joined.contains("--max_frames_num"));
        assert!(!joined.contains("--use_teacache"));
        assert!(joined.contains("--mode clip"));
    }

    #[test]
    fn test_sample_steps_record_override() {
        let config = test_config(Path::new("/opt/multitalk"));
        let runner = JobRunner::new(&config);
        let record: JobRecord = serde_json::from_str(
            r#"{"speech_text": "hi", "sample_steps": 12, "avatar_path": "a.png",
                "kokoro_voice": "af_heart", "video_prompt": "p"}"#,
        )
        .unwrap();
        let budget = frames::plan("hi", record.mode);

        let command = runner
            .build_command(
                Path::new("/tmp/in.json"),
                Path::new("/tmp/audio"),
                Path::new("/tmp/out.mp4"),
                &record,
                &budget,
            )
            .unwrap();
        assert!(command.join(" ").contains("--sample_steps 12"));
    }

    #[test]
    fn test_prepare_work_dir_override_and_keyed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.runs_root = PathBuf::from("runs");
        let runner = JobRunner::new(&config);

        let keyed = runner.prepare_work_dir("job-42", None).unwrap();
        assert!(keyed.ends_with("runs/job-42"));
        assert!(keyed.is_dir());
        // Повторный вызов идемпотентен
        runner.prepare_work_dir("job-42", None).unwrap();

        let override_dir = dir.path().join("custom");
        let prepared = runner
            .prepare_work_dir("job-42", Some(&override_dir))
            .unwrap();
        assert_eq!(prepared, override_dir);
        assert!(prepared.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_kokoro_weights_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let kokoro = dir.path().join("kokoro-weights");
        std::fs::create_dir_all(&kokoro).unwrap();

        let mut config = test_config(dir.path());
        config.kokoro_dir = kokoro.clone();
        let runner = JobRunner::new(&config);

        runner.ensure_kokoro_weights().unwrap();
        let link = dir.path().join("weights/Kokoro-82M");
        assert!(link.exists());
        assert_eq!(std::fs::read_link(&link).unwrap(), kokoro);

        // Повторный вызов не падает на существующей ссылке
        runner.ensure_kokoro_weights().unwrap();
    }
}
