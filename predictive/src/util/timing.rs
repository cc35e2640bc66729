use std::borrow::Cow;
use std::time::{Duration, Instant};

use log::{self, Level};

/// Logs how long a resolution phase took when dropped.
pub struct ScopedTimer {
    label: Option<Cow<'static, str>>,
    level: Level,
    start: Instant,
}

impl ScopedTimer {
    pub fn with_level(label: impl Into<Cow<'static, str>>, level: Level) -> Self {
        let label = log::log_enabled!(level).then(|| label.into());
        Self {
            label,
            level,
            start: Instant::now(),
        }
    }

    pub fn debug(label: impl Into<Cow<'static, str>>) -> Self {
        Self::with_level(label, Level::Debug)
    }

    /// Only builds the label when debug logging is on.
    pub fn debug_lazy<F>(label_gen: F) -> Self
    where
        F: FnOnce() -> String,
    {
        let label = log::log_enabled!(Level::Debug).then(|| Cow::Owned(label_gen()));
        Self {
            label,
            level: Level::Debug,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let Some(label) = &self.label {
            let millis = self.start.elapsed().as_secs_f64() * 1e3;
            log::log!(self.level, "{} took {:.3} ms", label, millis);
        }
    }
}

pub fn measure_debug_lazy<T, F, L>(label_gen: L, f: F) -> T
where
    F: FnOnce() -> T,
    L: FnOnce() -> String,
{
    let _timer = ScopedTimer::debug_lazy(label_gen);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_closure_result_is_returned() {
        let value = measure_debug_lazy(|| "sum".to_string(), || (1..=4).sum::<i32>());
        assert_eq!(value, 10);
    }

    #[test]
    fn elapsed_is_monotonic() {
        let timer = ScopedTimer::debug("phase");
        let first = timer.elapsed();
        assert!(timer.elapsed() >= first);
    }
}
