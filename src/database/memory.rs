use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::database::{
    table::bitcoin_price::{NewPriceSample, PriceSample},
    PriceRepository,
};

/// 測試用的記憶體資料表，可模擬寫入或讀取失敗。
#[derive(Default)]
pub struct MemoryRepository {
    rows: Mutex<Vec<PriceSample>>,
    fail_insert: AtomicBool,
    fail_fetch: AtomicBool,
    ensure_calls: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Default::default()
    }

    /// 之後的寫入都會失敗，模擬連線已被關閉
    pub fn set_fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<PriceSample> {
        self.rows.lock().unwrap().clone()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceRepository for MemoryRepository {
    async fn ensure_table(&self) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, sample: &NewPriceSample) -> Result<PriceSample> {
        if self.fail_insert.load(Ordering::SeqCst) {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(anyhow!("connection closed"));
        }

        let mut rows = self.rows.lock().unwrap();
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let saved = sample.clone().with_id(id);
        rows.push(saved.clone());
        Ok(saved)
    }

    async fn fetch_all(&self) -> Result<Vec<PriceSample>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }

        let mut rows = self.rows();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }
}
