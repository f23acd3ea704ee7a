use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use coin_price_crawler::{
    config,
    database::{table::bitcoin_price::BitcoinPriceTable, PostgresSQL},
    logging,
    util::signal::shutdown_signal,
    web::{self, DashboardState},
};

#[cfg(all(target_os = "linux", target_env = "musl"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let code = match run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(why) => {
            logging::error_file_async(format!("報表伺服器啟動失敗 {:#}", why));
            logging::error_console(format!("dashboard stopped: {:#}", why));
            ExitCode::FAILURE
        }
    };

    logging::flush();
    code
}

async fn run() -> Result<()> {
    let settings = config::App::get()?;
    let db = PostgresSQL::new(&settings.postgresql)?;
    let table = BitcoinPriceTable::new(db, &settings.postgresql.table)?;
    let state = DashboardState {
        repo: Arc::new(table),
    };

    web::serve(&settings.dashboard, state, shutdown_signal()).await
}
