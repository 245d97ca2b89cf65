use std::borrow::Cow;
use std::time::Instant;

use log::{self, Level};

/// Logs how long a scope took when dropped.
pub struct ScopedTimer {
    label: Option<Cow<'static, str>>,
    level: Level,
    start: Option<Instant>,
}

impl ScopedTimer {
    pub fn with_level(label: impl Into<Cow<'static, str>>, level: Level) -> Self {
        Self {
            label: Some(label.into()),
            level,
            start: Some(Instant::now()),
        }
    }

    pub fn debug(label: impl Into<Cow<'static, str>>) -> Self {
        Self::with_level(label, Level::Debug)
    }

    /// Only builds the label (and reads the clock) when `level` is enabled.
    pub fn lazy<F>(level: Level, label_gen: F) -> Self
    where
        F: FnOnce() -> String,
    {
        if log::log_enabled!(level) {
            Self::with_level(label_gen(), level)
        } else {
            Self {
                label: None,
                level,
                start: None,
            }
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let (Some(label), Some(start)) = (&self.label, self.start) {
            let micros = start.elapsed().as_micros();
            log::log!(self.level, "{} took {} us", label, micros);
        }
    }
}

pub fn measure_lazy<T, F, L>(level: Level, label_gen: L, f: F) -> T
where
    F: FnOnce() -> T,
    L: FnOnce() -> String,
{
    let _timer = ScopedTimer::lazy(level, label_gen);
    f()
}
