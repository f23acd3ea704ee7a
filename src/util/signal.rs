use tokio::signal;

use crate::logging;

/// 等待 Ctrl-C，unix 上也接受 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(why) = signal::ctrl_c().await {
            logging::error_file_async(format!("Failed to listen for Ctrl-C because {:?}", why));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(why) => {
                logging::error_file_async(format!("Failed to listen for SIGTERM because {:?}", why));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => logging::info_file_async("收到 Ctrl-C".to_string()),
        _ = terminate => logging::info_file_async("收到 SIGTERM".to_string()),
    }
}
