use std::str::FromStr;

use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::{database::table::bitcoin_price::NewPriceSample, error::PipelineError};

/// 幣別與貨幣代號的最大長度，對應資料表的 VARCHAR(16)
const MAX_SYMBOL_LEN: usize = 16;

/// 將 API 的原始回應轉成待寫入的報價，並蓋上目前時間。
///
/// 預期格式︰`{"data":{"amount":"50000.12","base":"BTC","currency":"USD"}}`
pub fn transform(raw: &Value) -> Result<NewPriceSample, PipelineError> {
    transform_at(raw, Local::now())
}

/// 同 [`transform`]，但使用指定的觀測時間
pub fn transform_at(raw: &Value, observed_at: DateTime<Local>) -> Result<NewPriceSample, PipelineError> {
    let data = raw
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| PipelineError::Parse(format!("missing object `data` in {}", raw)))?;

    let valor = parse_amount(data.get("amount"))?;
    let criptomoeda = parse_symbol(data, "base")?;
    let moeda = parse_symbol(data, "currency")?;

    Ok(NewPriceSample::new(valor, criptomoeda, moeda, observed_at))
}

fn parse_amount(amount: Option<&Value>) -> Result<Decimal, PipelineError> {
    let text = match amount {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(PipelineError::Parse(format!(
                "`data.amount` is not numeric: {}",
                other
            )))
        }
        None => return Err(PipelineError::Parse("missing `data.amount`".to_string())),
    };

    // 不做任何字元清理，千分位、貨幣符號或中間的空白都視為格式錯誤
    let valor = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|why| {
            PipelineError::Parse(format!("`data.amount` {:?} is not numeric: {}", text, why))
        })?;

    if valor <= Decimal::ZERO {
        return Err(PipelineError::Parse(format!(
            "`data.amount` must be positive, got {}",
            valor
        )));
    }

    Ok(valor)
}

fn parse_symbol(data: &Value, field: &str) -> Result<String, PipelineError> {
    let symbol = data
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or_else(|| PipelineError::Parse(format!("missing text `data.{}`", field)))?;

    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return Err(PipelineError::Parse(format!(
            "`data.{}` has an invalid length: {:?}",
            field, symbol
        )));
    }

    Ok(symbol.to_string())
}
