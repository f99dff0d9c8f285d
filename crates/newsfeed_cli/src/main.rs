//! Single-process worker driver.
//!
//! Usage: `newsfeed_cli <db-path> [config.json]`
//!
//! Reads one JSON command per line from stdin, handles it with a worker whose
//! sink applies feed events directly to the same database, and prints the
//! delivery outcome per line. Set `NEWSFEED_LOG_DIR` to an absolute path to
//! enable file logging.

use log::info;
use newsfeed_core::db::open_db;
use newsfeed_core::{
    init_logging, EngineConfig, LogErrorReporter, MaterializingSink, MemoryReadModel,
    SqliteFeedStore, Worker,
};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        eprintln!("usage: newsfeed_cli <db-path> [config.json]");
        return ExitCode::from(2);
    };

    let config = match args.next().map(EngineConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match run(&db_path, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: &str, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(log_dir) = std::env::var("NEWSFEED_LOG_DIR") {
        init_logging(&config.log_level, &log_dir)?;
    }
    info!("event=cli_start module=cli status=ok db_path={db_path}");

    let conn = open_db(db_path)?;
    let sink = MaterializingSink::new(SqliteFeedStore::new(&conn));
    let read_model = MemoryReadModel::new();
    let reporter = LogErrorReporter;
    let worker = Worker::new(&conn, &sink, &read_model, &reporter, config);

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let delivery = worker.handle_raw(&line);
        writeln!(stdout, "{} {}", index + 1, delivery.as_str())?;
    }
    Ok(())
}
