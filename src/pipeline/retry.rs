use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};

use crate::config;

/// 失敗後休息時間的成長方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 不論成功失敗都休息相同時間
    Fixed,
    /// 連續失敗時休息時間加倍，最多到 `max_delay`
    Exponential { max_delay: Duration },
}

/// 擷取迴圈的重試策略。
///
/// 預設行為是每輪之後固定休息 15 秒且永不放棄；`escalate_after` 設定後，連續失敗
/// 達到次數時迴圈會結束並回傳錯誤，交由外部的 supervisor 處理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub backoff: Backoff,
    pub escalate_after: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(Duration::from_secs(15))
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            backoff: Backoff::Fixed,
            escalate_after: None,
        }
    }

    pub fn exponential(interval: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            interval,
            backoff: Backoff::Exponential { max_delay },
            escalate_after: None,
        }
    }

    pub fn escalate_after(mut self, consecutive_failures: u32) -> Self {
        self.escalate_after = Some(consecutive_failures);
        self
    }

    /// 依設定檔建立
    ///
    /// # Errors
    /// `interval_secs` 為 0，或 `backoff` 不是 `fixed` 或 `exponential` 時回傳錯誤。
    pub fn from_settings(settings: &config::Pipeline) -> Result<Self> {
        if settings.interval_secs == 0 {
            return Err(anyhow!("pipeline interval_secs must be at least 1"));
        }

        let interval = Duration::from_secs(settings.interval_secs);
        let policy = match settings.backoff.trim().to_ascii_lowercase().as_str() {
            "fixed" | "" => RetryPolicy::fixed(interval),
            "exponential" => {
                RetryPolicy::exponential(interval, Duration::from_secs(settings.max_delay_secs))
            }
            other => return Err(anyhow!("unknown pipeline backoff {:?}", other)),
        };

        Ok(match settings.escalate_after {
            0 => policy,
            n => policy.escalate_after(n),
        })
    }

    /// 成功的一輪之後要休息多久
    pub fn success_delay(&self) -> Duration {
        self.interval
    }

    /// 連續第 `consecutive_failures` 次失敗之後要休息多久
    pub fn failure_delay(&self, consecutive_failures: u32) -> Duration {
        let nth = consecutive_failures.saturating_sub(1) as usize;
        self.failure_delays().nth(nth).unwrap_or(self.interval)
    }

    /// 連續失敗次數是否已達上限
    pub fn should_escalate(&self, consecutive_failures: u32) -> bool {
        matches!(self.escalate_after, Some(n) if consecutive_failures >= n)
    }

    fn failure_delays(&self) -> Box<dyn Iterator<Item = Duration>> {
        match self.backoff {
            Backoff::Fixed => Box::new(FixedInterval::new(self.interval)),
            Backoff::Exponential { max_delay } => {
                // 2 * factor, 4 * factor, 8 * factor ... 第一次剛好等於 interval
                let factor = (self.interval.as_millis() as u64 / 2).max(1);
                Box::new(
                    ExponentialBackoff::from_millis(2)
                        .factor(factor)
                        .max_delay(max_delay.max(self.interval)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_ignores_failures() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.success_delay(), Duration::from_secs(15));
        assert_eq!(policy.failure_delay(1), Duration::from_secs(15));
        assert_eq!(policy.failure_delay(50), Duration::from_secs(15));
        assert!(!policy.should_escalate(u32::MAX));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(Duration::from_secs(10), Duration::from_secs(60));
        assert_eq!(policy.success_delay(), Duration::from_secs(10));
        assert_eq!(policy.failure_delay(1), Duration::from_secs(10));
        assert_eq!(policy.failure_delay(2), Duration::from_secs(20));
        assert_eq!(policy.failure_delay(3), Duration::from_secs(40));
        assert_eq!(policy.failure_delay(4), Duration::from_secs(60));
        assert_eq!(policy.failure_delay(30), Duration::from_secs(60));
    }

    #[test]
    fn test_escalate_after() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1)).escalate_after(3);
        assert!(!policy.should_escalate(2));
        assert!(policy.should_escalate(3));
        assert!(policy.should_escalate(4));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = config::Pipeline::default();
        assert_eq!(
            RetryPolicy::from_settings(&settings).unwrap(),
            RetryPolicy::fixed(Duration::from_secs(15))
        );

        settings.backoff = "Exponential".to_string();
        settings.max_delay_secs = 120;
        settings.escalate_after = 5;
        assert_eq!(
            RetryPolicy::from_settings(&settings).unwrap(),
            RetryPolicy::exponential(Duration::from_secs(15), Duration::from_secs(120))
                .escalate_after(5)
        );

        settings.backoff = "linear".to_string();
        assert!(RetryPolicy::from_settings(&settings).is_err());
    }

    #[test]
    fn test_from_settings_rejects_zero_interval() {
        let settings = config::Pipeline {
            interval_secs: 0,
            ..Default::default()
        };
        let err = RetryPolicy::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }
}
