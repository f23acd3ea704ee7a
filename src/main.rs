use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use coin_price_crawler::{
    config,
    crawler::coinbase::Coinbase,
    database::{table::bitcoin_price::BitcoinPriceTable, PostgresSQL},
    logging,
    pipeline::{Pipeline, RetryPolicy},
    util::signal::shutdown_signal,
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
            logging::error_file_async(format!("擷取流程異常結束 {:#}", why));
            logging::error_console(format!("coin_price_crawler stopped: {:#}", why));
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
    let source = Coinbase::new(&settings.crawler)?;
    let policy = RetryPolicy::from_settings(&settings.pipeline)?;

    logging::info_file_async(format!(
        "報價來源 {}，寫入 {}，策略 {:?}",
        source.url(),
        table.table(),
        policy
    ));

    let pipeline = Pipeline::new(Arc::new(source), Arc::new(table), policy);
    pipeline.prepare().await?;

    let stats = pipeline.run(shutdown_signal()).await?;
    logging::info_console(format!(
        "coin_price_crawler stopped after {} cycles ({} persisted)",
        stats.cycles, stats.persisted
    ));

    Ok(())
}
