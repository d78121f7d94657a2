use anyhow::Result;
use colored::{ColoredString, Colorize};
use std::fs;
use std::path::{Path, PathBuf};

const LOG_PREFIX: &str = "server_chainsub_";

/// Console output is colored, the log file is plain. Returns the new log file.
pub fn setup_logging(log_dir: &Path, log_level: &str, keep: usize) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Leave room for the file about to be created
    cleanup_old_logs(log_dir, keep.saturating_sub(1))?;

    let log_file_name = format!("{}{}.log", LOG_PREFIX, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    let console = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]").to_string().truecolor(128, 128, 128),
                record.target(),
                colored_level(record.level()),
                message
            ))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .chain(fern::log_file(&log_path)?);

    fern::Dispatch::new()
        .level(parse_level(log_level))
        .chain(console)
        .chain(file)
        .apply()?;

    Ok(log_path)
}

pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

fn colored_level(level: log::Level) -> ColoredString {
    match level {
        log::Level::Error => level.as_str().bright_red(),
        log::Level::Warn => level.as_str().bright_yellow(),
        log::Level::Info => level.as_str().bright_green(),
        log::Level::Debug => level.as_str().bright_white(),
        log::Level::Trace => level.as_str().bright_cyan(),
    }
}

/// Deletes all but the `keep` most recent daemon log files. Returns how many
/// were removed.
pub fn cleanup_old_logs(log_dir: &Path, keep: usize) -> Result<usize> {
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| {
            let path = e.path();
            path.extension().is_some_and(|ext| ext == "log")
                && e.file_name().to_string_lossy().starts_with(LOG_PREFIX)
        })
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Sort by modification time, newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn keeps_only_the_newest_daemon_logs() {
        let dir = tempfile::tempdir().unwrap();
        let newest = touch(dir.path(), "server_chainsub_c.log", 10);
        let middle = touch(dir.path(), "server_chainsub_b.log", 20);
        let oldest = touch(dir.path(), "server_chainsub_a.log", 30);
        let foreign = touch(dir.path(), "other_service.log", 40);
        let notes = touch(dir.path(), "server_chainsub_notes.txt", 50);

        assert_eq!(cleanup_old_logs(dir.path(), 2).unwrap(), 1);
        assert!(newest.exists());
        assert!(middle.exists());
        assert!(!oldest.exists());
        assert!(foreign.exists());
        assert!(notes.exists());

        assert_eq!(cleanup_old_logs(dir.path(), 0).unwrap(), 2);
        assert!(!newest.exists());
    }

    #[test]
    fn unknown_levels_default_to_info() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("fatal"), log::LevelFilter::Info);
        assert_eq!(parse_level("off"), log::LevelFilter::Off);
    }
}
