use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Initialize logging. With `to_file` set, logs also go to
/// `<data dir>/logs/moonglow.log`, truncated once it passes 1MB.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(to_file: bool) -> io::Result<Option<WorkerGuard>> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_file {
        let log_dir = moonglow_client::config::paths::data_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .join("logs");
        fs::create_dir_all(&log_dir)?;

        let log_path = log_dir.join("moonglow.log");
        truncate_if_needed(&log_path)?;

        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
            .with(
                fmt::layer()
                    .with_writer(non_blocking_file)
                    .with_ansi(false)
                    .with_target(true),
            )
            .init();

        tracing::info!("Logging to file: {}", log_path.display());
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        Ok(None)
    }
}

fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        let file = File::create(log_path)?;
        file.set_len(0)?;
    }
    Ok(())
}
