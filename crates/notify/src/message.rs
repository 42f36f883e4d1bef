use chrono::{DateTime, Local};

use common::{Alert, Direction, MonitorState};

/// ntfy message priority header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Default,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Default => write!(f, "default"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A fully formatted message ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Comma-separated ntfy tags.
    pub tags: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority: Priority::Default,
            tags: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn for_alert(alert: &Alert) -> Self {
        let pair = alert.pair();
        let (title, message, tags) = match alert {
            Alert::AboveUpper {
                price, threshold, ..
            } => (
                format!("Price Alert - {pair}"),
                format!("{pair}: price ${price:.2} is above upper threshold ${threshold:.2}"),
                "rocket,up,alert",
            ),
            Alert::BelowLower {
                price, threshold, ..
            } => (
                format!("Price Alert - {pair}"),
                format!("{pair}: price ${price:.2} is below lower threshold ${threshold:.2}"),
                "chart-decreasing,down,alert",
            ),
            Alert::Swing {
                price,
                reference,
                change_pct,
                direction: Direction::Up,
                ..
            } => (
                format!("Price Change Alert - {pair}"),
                format!("{pair}: price up {change_pct:.2}% from ${reference:.2} to ${price:.2}"),
                "chart-increasing,up,trending",
            ),
            Alert::Swing {
                price,
                reference,
                change_pct,
                direction: Direction::Down,
                ..
            } => (
                format!("Price Change Alert - {pair}"),
                format!("{pair}: price down {change_pct:.2}% from ${reference:.2} to ${price:.2}"),
                "chart-decreasing,down,trending",
            ),
        };
        Self::new(title, message)
            .with_priority(Priority::High)
            .with_tags(tags)
    }

    pub fn test(now: DateTime<Local>) -> Self {
        Self::new(
            "Crypto Monitor Test",
            format!(
                "Test notification from Crypto Monitor\nTime: {}",
                now.format("%Y-%m-%d %H:%M:%S")
            ),
        )
        .with_tags("test")
    }

    pub fn status(state: MonitorState) -> Self {
        match state {
            MonitorState::Running => Self::new(
                "Monitoring Started",
                "Crypto price monitoring has been started",
            )
            .with_tags("green,start,monitoring"),
            MonitorState::Stopped => Self::new(
                "Monitoring Stopped",
                "Crypto price monitoring has been stopped",
            )
            .with_tags("red,stop,monitoring"),
        }
    }
}
