/// 加密貨幣報價 (`bitcoin_precos`)
pub mod bitcoin_price;
