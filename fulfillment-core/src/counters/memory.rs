use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    CounterError, CounterOptions, CounterResult, CounterService, CounterValue,
    invoice_number_options, order_number_options,
};
use crate::core::{Clock, SystemClock};

/// 进程内计数器
///
/// 单把互斥锁保证同一 `scope:name` 下严格递增。
pub struct MemoryCounterService {
    values: Mutex<HashMap<(String, String), i64>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCounterService {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryCounterService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Current value without allocating
    pub fn peek(&self, scope: &str, name: &str) -> Option<i64> {
        self.values
            .lock()
            .get(&(scope.to_string(), name.to_string()))
            .copied()
    }
}

#[async_trait]
impl CounterService for MemoryCounterService {
    async fn next(
        &self,
        scope: &str,
        name: &str,
        options: CounterOptions,
    ) -> CounterResult<CounterValue> {
        let scope = scope.trim();
        let name = name.trim();
        if scope.is_empty() || name.is_empty() {
            return Err(CounterError::InvalidInput("scope and name are required".into()));
        }
        if options.step <= 0 {
            return Err(CounterError::InvalidInput("step must be positive".into()));
        }

        let value = {
            let mut values = self.values.lock();
            let key = (scope.to_string(), name.to_string());
            let current = values
                .get(&key)
                .copied()
                .unwrap_or_else(|| options.initial_value.unwrap_or(0));
            let next = current
                .checked_add(options.step)
                .ok_or_else(|| CounterError::Exhausted(format!("{}:{}", scope, name)))?;
            if let Some(max) = options.max_value
                && next > max
            {
                return Err(CounterError::Exhausted(format!("{}:{}", scope, name)));
            }
            values.insert(key, next);
            next
        };

        Ok(CounterValue {
            value,
            formatted: options.format(self.clock.now(), value),
        })
    }

    async fn next_order_number(&self) -> CounterResult<String> {
        let (name, options) = order_number_options(self.clock.now());
        Ok(self.next("orders", &name, options).await?.formatted)
    }

    async fn next_invoice_number(&self) -> CounterResult<String> {
        let (name, options) = invoice_number_options(self.clock.now());
        Ok(self.next("invoices", &name, options).await?.formatted)
    }
}
