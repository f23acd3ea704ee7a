use std::{
    env,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::Duration,
};

use chrono::{format::DelayedFormat, DateTime, Local, NaiveDate};
use concat_string::concat_string;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::LevelFilter;
use once_cell::sync::Lazy;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

/// 單次寫檔前累積的最大字元數
const FLUSH_THRESHOLD: usize = 4096;

/// 等待背景執行緒寫完的最長時間
const FLUSH_WAIT: Duration = Duration::from_secs(3);

/// 日誌等級的環境變數，例︰`LOG_LEVEL=debug`
const LOG_LEVEL: &str = "LOG_LEVEL";

/// 送往寫檔執行緒的指令
enum Entry {
    Line(LogMessage),
    /// 寫出目前累積的內容後回覆
    Flush(Sender<()>),
}

/// 以背景執行緒寫入日誌檔的 logger。
///
/// 訊息經由 channel 送出，呼叫端不會因為磁碟 I/O 而阻塞。
///
/// 低於 `max_level` 的訊息直接丟棄，預設等級由 `LOG_LEVEL` 決定（未設定時為 info）。
pub struct Logger {
    writer: Sender<Entry>,
    max_level: LevelFilter,
}

impl Logger {
    /// 建立一個寫入 `log/<日期>_<log_name>.log` 的 logger
    pub fn new(log_name: &str) -> Self {
        Logger::with_level(log_name, max_level_from_env())
    }

    pub fn with_level(log_name: &str, max_level: LevelFilter) -> Self {
        let (tx, rx) = unbounded::<Entry>();
        let name = log_name.to_string();

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || write_loop(&name, rx));

        Logger {
            writer: tx,
            max_level,
        }
    }

    /// 阻塞到先前送出的訊息都已寫入檔案，或超過 [`FLUSH_WAIT`]
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded::<()>(1);
        if self.writer.send(Entry::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(FLUSH_WAIT);
        }
    }

    pub fn info(&self, log: String) {
        self.send(log::Level::Info, log);
    }

    pub fn warn(&self, log: String) {
        self.send(log::Level::Warn, log);
    }

    pub fn error(&self, log: String) {
        self.send(log::Level::Error, log);
    }

    pub fn debug(&self, log: String) {
        self.send(log::Level::Debug, log);
    }

    fn send(&self, level: log::Level, msg: String) {
        if level > self.max_level {
            return;
        }

        if let Err(why) = self.writer.send(Entry::Line(LogMessage::new(level, msg))) {
            error_console(why.to_string());
        }
    }
}

pub struct LogMessage {
    pub level: log::Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: log::Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

/// 日期變更時自動換檔的輸出端
struct DailyFile {
    name: String,
    date: Option<NaiveDate>,
    writer: Option<BufWriter<File>>,
}

impl DailyFile {
    fn new(name: &str) -> Self {
        DailyFile {
            name: name.to_string(),
            date: None,
            writer: None,
        }
    }

    fn write_all(&mut self, now: DateTime<Local>, line: &str) -> std::io::Result<()> {
        let today = now.date_naive();
        if self.date != Some(today) || self.writer.is_none() {
            if let Some(mut old) = self.writer.take() {
                old.flush()?;
            }

            let path = log_path(&self.name, today)?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.writer = Some(BufWriter::new(file));
            self.date = Some(today);
        }

        match self.writer.as_mut() {
            Some(w) => {
                w.write_all(line.as_bytes())?;
                w.flush()
            }
            None => Ok(()),
        }
    }
}

fn write_loop(name: &str, rx: Receiver<Entry>) {
    let mut out = DailyFile::new(name);
    let mut together = String::with_capacity(FLUSH_THRESHOLD);
    let mut last_at = Local::now();

    while let Ok(entry) = rx.recv() {
        let ack = match entry {
            Entry::Line(received) => {
                last_at = received.created_at;
                together.push_str(
                    concat_string!(
                        received.created_at.format("%F %X%.6f").to_string(),
                        " ",
                        received.level.to_string(),
                        " ",
                        received.msg,
                        "\r\n"
                    )
                    .as_str(),
                );
                None
            }
            Entry::Flush(ack) => Some(ack),
        };

        if !together.is_empty()
            && (ack.is_some() || rx.is_empty() || together.len() >= FLUSH_THRESHOLD)
        {
            if let Err(why) = out.write_all(last_at, &together) {
                error_console(format!("Failed to write to log file. because:{:?}", why));
                info_console(together.clone());
            }

            together.clear();
        }

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    if !together.is_empty() {
        let _ = out.write_all(last_at, &together);
    }
}

fn max_level_from_env() -> LevelFilter {
    env::var(LOG_LEVEL)
        .ok()
        .and_then(|level| LevelFilter::from_str(level.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

fn log_path(name: &str, date: NaiveDate) -> std::io::Result<PathBuf> {
    let path = Path::new("log");

    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    let mut log_path = PathBuf::from(path);
    log_path.push(format!("{}_{}.log", date.format("%Y-%m-%d"), name));

    Ok(log_path)
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

/// 結束程序前呼叫，確保排隊中的日誌都已寫入
pub fn flush() {
    LOGGER.flush();
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    println!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let path = log_path("http", date).unwrap();
        assert_eq!(path, PathBuf::from("log").join("2024-03-09_http.log"));
    }

    #[test]
    fn test_flush_writes_pending_lines() {
        let logger = Logger::with_level("logging_test", LevelFilter::Info);
        logger.info("寫入測試".to_string());
        logger.error("error line".to_string());
        logger.flush();

        let path = log_path("logging_test", Local::now().date_naive()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO 寫入測試"));
        assert!(content.contains("ERROR error line"));
    }

    #[test]
    fn test_level_filter_drops_debug() {
        let logger = Logger::with_level("logging_level_test", LevelFilter::Info);
        logger.debug("cycle state -> Fetching".to_string());
        logger.warn("no quote".to_string());
        logger.flush();

        let path = log_path("logging_level_test", Local::now().date_naive()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("WARN no quote"));
        assert!(!content.contains("cycle state"));
    }
}
