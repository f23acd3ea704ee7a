use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::{
    config,
    database::PriceRepository,
    logging,
    report::{self, html, ReportView, Summary},
};

/// 報表伺服器共用狀態
#[derive(Clone)]
pub struct DashboardState {
    pub repo: Arc<dyn PriceRepository>,
}

/// 圖表用的資料點
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub data: DateTime<Local>,
    pub valor: Decimal,
}

/// `GET /api/summary` 的回應
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SummaryResponse {
    pub summary: Option<Summary>,
    pub series: Vec<PricePoint>,
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
}

/// 建立路由
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/summary", get(summary))
        .route("/health", get(health))
        .with_state(state)
}

/// 啟動報表伺服器，`shutdown` 完成後停止接受新連線並結束
pub async fn serve<F>(
    settings: &config::Dashboard,
    state: DashboardState,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind dashboard on {}", addr))?;

    logging::info_file_async(format!("報表伺服器正在 {} 開始服務...", addr));
    logging::info_console(format!("Dashboard listening on http://{}", addr));

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    match &result {
        Ok(_) => logging::info_file_async(format!("報表伺服器在 {} 正常停止", addr)),
        Err(why) => logging::error_file_async(format!("報表伺服器運行中斷 ({}): {}", addr, why)),
    }

    Ok(result?)
}

async fn index(State(state): State<DashboardState>) -> Html<String> {
    let view = report::load(state.repo.as_ref()).await;
    Html(html::render(&view))
}

async fn summary(State(state): State<DashboardState>) -> Response {
    match report::load(state.repo.as_ref()).await {
        ReportView::Data(report) => Json(SummaryResponse {
            summary: Some(report.summary),
            series: report
                .series
                .into_iter()
                .map(|s| PricePoint {
                    data: s.data,
                    valor: s.valor,
                })
                .collect(),
        })
        .into_response(),
        ReportView::Empty => Json(SummaryResponse {
            summary: None,
            series: Vec::new(),
        })
        .into_response(),
        ReportView::Unavailable(why) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse { error: why }),
        )
            .into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}
