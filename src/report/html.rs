use std::fmt::Write as _;

use rust_decimal::prelude::ToPrimitive;

use crate::{
    database::table::bitcoin_price::PriceSample,
    report::{Report, ReportView},
    util::text::{escape_html, format_money},
};

const CHART_WIDTH: f64 = 960.0;
const CHART_HEIGHT: f64 = 320.0;
const CHART_PADDING: f64 = 24.0;

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2rem auto; max-width: 1040px; color: #262730; }
h1 { font-size: 2rem; }
h2 { font-size: 1.4rem; margin-top: 2rem; }
table { border-collapse: collapse; width: 100%; font-size: .9rem; }
th, td { border-bottom: 1px solid #e6e6e6; padding: .35rem .6rem; text-align: right; }
th { background: #f6f6f9; }
.scroll { max-height: 360px; overflow-y: auto; }
.metrics { display: flex; gap: 2rem; }
.metric { flex: 1; }
.metric .label { font-size: .9rem; color: #555; }
.metric .value { font-size: 2rem; }
.warning { background: #fffce7; border: 1px solid #f5d90a; padding: 1rem; border-radius: .4rem; }
.error { background: #ffecec; border: 1px solid #ff4b4b; padding: 1rem; border-radius: .4rem; }
svg polyline { fill: none; stroke: #1f77b4; stroke-width: 2; }
"#;

/// 輸出完整的報表頁面
pub fn render(view: &ReportView) -> String {
    let mut body = String::with_capacity(16 * 1024);
    body.push_str("<h1>📊 Bitcoin Price Dashboard</h1>\n");
    body.push_str(
        "<p>Prices collected periodically by the crawler and stored in PostgreSQL.</p>\n",
    );

    match view {
        ReportView::Data(report) => render_report(&mut body, report),
        ReportView::Empty => render_no_data(&mut body),
        ReportView::Unavailable(why) => {
            let _ = writeln!(
                body,
                r#"<div class="error">Failed to read from PostgreSQL: {}</div>"#,
                escape_html(why)
            );
            render_no_data(&mut body);
        }
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Bitcoin Price Dashboard</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        STYLE, body
    )
}

fn render_no_data(body: &mut String) {
    body.push_str(r#"<div class="warning">No data found in the PostgreSQL database.</div>"#);
    body.push('\n');
}

fn render_report(body: &mut String, report: &Report) {
    body.push_str("<h2>📋 Recent data</h2>\n");
    render_table(body, &report.recent);

    let _ = writeln!(
        body,
        "<h2>📈 {} price history ({})</h2>",
        escape_html(&report.summary.criptomoeda),
        escape_html(&report.summary.moeda)
    );
    render_chart(body, &report.series);

    body.push_str("<h2>🔢 Statistics</h2>\n<div class=\"metrics\">\n");
    for (label, value) in [
        ("Current price", report.summary.latest),
        ("Highest price", report.summary.max),
        ("Lowest price", report.summary.min),
    ] {
        let _ = writeln!(
            body,
            r#"<div class="metric"><div class="label">{}</div><div class="value">{}</div></div>"#,
            label,
            format_money(value)
        );
    }
    body.push_str("</div>\n");
}

fn render_table(body: &mut String, rows: &[PriceSample]) {
    body.push_str(
        "<div class=\"scroll\"><table>\n<thead><tr><th>id</th><th>valor</th><th>criptomoeda</th><th>moeda</th><th>data</th></tr></thead>\n<tbody>\n",
    );
    for row in rows {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.id,
            row.valor,
            escape_html(&row.criptomoeda),
            escape_html(&row.moeda),
            row.data.format("%Y-%m-%d %H:%M:%S")
        );
    }
    body.push_str("</tbody>\n</table></div>\n");
}

fn render_chart(body: &mut String, series: &[PriceSample]) {
    let points = chart_points(series, CHART_WIDTH, CHART_HEIGHT);
    let polyline = points
        .iter()
        .map(|(x, y)| format!("{:.1},{:.1}", x, y))
        .collect::<Vec<_>>()
        .join(" ");

    let _ = writeln!(
        body,
        r#"<svg viewBox="0 0 {w} {h}" width="100%" role="img" aria-label="price chart"><polyline points="{points}"/></svg>"#,
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        points = polyline
    );

    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        let _ = writeln!(
            body,
            "<p><small>{} → {}</small></p>",
            first.data.format("%Y-%m-%d %H:%M:%S"),
            last.data.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// 將資料點換算成 SVG 座標︰x 為時間，y 為價格（上方為高價）
///
/// 只有一個點或所有值相同時，畫在中線上。
pub fn chart_points(series: &[PriceSample], width: f64, height: f64) -> Vec<(f64, f64)> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Vec::new();
    };

    let t0 = first.data.timestamp_millis() as f64;
    let t_span = (last.data.timestamp_millis() as f64 - t0).max(0.0);
    let values: Vec<f64> = series
        .iter()
        .map(|s| s.valor.to_f64().unwrap_or_default())
        .collect();
    let v_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let v_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let v_span = v_max - v_min;

    let inner_w = width - 2.0 * CHART_PADDING;
    let inner_h = height - 2.0 * CHART_PADDING;
    let count = series.len();

    series
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (s, v))| {
            let x = if t_span > 0.0 {
                (s.data.timestamp_millis() as f64 - t0) / t_span
            } else if count > 1 {
                i as f64 / (count - 1) as f64
            } else {
                0.5
            };
            let y = if v_span > 0.0 {
                1.0 - (v - v_min) / v_span
            } else {
                0.5
            };
            (
                CHART_PADDING + x * inner_w,
                CHART_PADDING + y * inner_h,
            )
        })
        .collect()
}
