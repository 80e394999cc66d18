use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};
use log::{LevelFilter, Record};
use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct LogMessage {
    level: String,
    message: String,
    timestamp: String,
}

impl LogMessage {
    fn from_record(record: &Record) -> Self {
        Self {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        }
    }
}

/// Installs the global logger writing to stderr.
///
/// `level` is used unless `RUST_LOG` is set. With `json`, every record is
/// written as one [`LogMessage`] object per line.
pub fn init(level: &str, json: bool) -> Result<(), log::SetLoggerError> {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));

    if json {
        builder.format(|buf, record| {
            let message = LogMessage::from_record(record);
            match serde_json::to_string(&message) {
                Ok(line) => writeln!(buf, "{}", line),
                Err(_) => writeln!(buf, "[{}] {}", message.level, message.message),
            }
        });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.args()
            )
        });
    }

    builder.try_init()?;
    log::info!("Logging initialized");
    Ok(())
}
