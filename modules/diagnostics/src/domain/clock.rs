use chrono::{DateTime, Local};
use deskkit::{Injectable, ServiceScope};

/// Process-wide clock; remembers when the plugin was first activated.
#[derive(Debug, Clone)]
pub struct SystemClock {
    started_at: DateTime<Local>,
}

impl SystemClock {
    #[must_use]
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// A fresh reading. Registered as a transient factory method.
    ///
    /// # Errors
    /// Never fails; the signature matches factory methods.
    #[allow(clippy::unnecessary_wraps)]
    pub fn now(&self) -> anyhow::Result<ClockReading> {
        let at = Local::now();
        Ok(ClockReading {
            at,
            uptime: at.signed_duration_since(self.started_at),
        })
    }
}

impl Injectable for SystemClock {
    fn inject(_scope: &ServiceScope) -> anyhow::Result<Self> {
        let started_at = Local::now();
        tracing::debug!(%started_at, "System clock activated");
        Ok(Self { started_at })
    }
}

/// One point in time as seen by a request.
#[derive(Debug, Clone, Copy)]
pub struct ClockReading {
    pub at: DateTime<Local>,
    pub uptime: chrono::TimeDelta,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use deskkit::ContainerBuilder;

    #[test]
    fn readings_move_forward_from_start() {
        let container = ContainerBuilder::new().build().unwrap();
        let clock = SystemClock::inject(&container.create_scope()).unwrap();

        let first = clock.now().unwrap();
        let second = clock.now().unwrap();
        assert!(first.at >= clock.started_at());
        assert!(second.at >= first.at);
        assert!(second.uptime >= first.uptime);
        assert!(first.uptime >= chrono::TimeDelta::zero());
    }
}
