//! バイナリ共通のログ初期化: stderr と logs/<name>_<timestamp>.log の両方に出す

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

/// stderr とログファイルへ同じ内容を書く
struct Tee {
    file: BufWriter<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn log_path(name: &str) -> String {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("logs/{}_{}.log", name, ts)
}

/// env_logger を初期化してログファイルのパスを返す
///
/// フィルタは `RUST_LOG`、未設定なら info。
pub fn init(name: &str) -> Result<String> {
    fs::create_dir_all("logs").context("failed to create logs directory")?;
    let path = log_path(name);
    let file = File::create(&path).with_context(|| format!("failed to create {}", path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(Tee {
            file: BufWriter::new(file),
        })))
        .try_init()
        .context("logger already initialised")?;

    log::info!("log file: {}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_format() {
        let path = log_path("pose-accuracy");
        assert!(path.starts_with("logs/pose-accuracy_"));
        assert!(path.ends_with(".log"));
        // YYYYmmdd_HHMMSS
        assert_eq!(path.len(), "logs/pose-accuracy_".len() + 15 + ".log".len());
    }
}
