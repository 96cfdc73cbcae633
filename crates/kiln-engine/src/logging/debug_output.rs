use std::fmt;

/// Category of a driver debug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugType {
    Error,
    DeprecatedBehavior,
    UndefinedBehavior,
    Portability,
    Performance,
    Other,
    Marker,
    PushGroup,
    PopGroup,
    Unknown,
}

impl DebugType {
    pub fn as_str(self) -> &'static str {
        match self {
            DebugType::Error => "ERROR",
            DebugType::DeprecatedBehavior => "DEPRECATED BEHAVIOR",
            DebugType::UndefinedBehavior => "UNDEFINED BEHAVIOR",
            DebugType::Portability => "PORTABILITY",
            DebugType::Performance => "PERFORMANCE",
            DebugType::Other => "OTHER",
            DebugType::Marker => "MARKER",
            DebugType::PushGroup => "PUSH_GROUP",
            DebugType::PopGroup => "POP_GROUP",
            DebugType::Unknown => "UNKNOWN",
        }
    }
}

/// Importance the driver attached to a debug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugSeverity {
    /// Errors, failed shader builds, dangerous undefined behavior.
    High,
    /// Major performance warnings, deprecated functionality.
    Medium,
    /// Redundant state changes, harmless undefined behavior.
    Low,
    Notification,
    Unknown,
}

impl DebugSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            DebugSeverity::High => "high",
            DebugSeverity::Medium => "medium",
            DebugSeverity::Low => "low",
            DebugSeverity::Notification => "notification",
            DebugSeverity::Unknown => "unknown",
        }
    }

    /// Log level used when forwarding a message of this severity.
    pub fn level(self) -> log::Level {
        match self {
            DebugSeverity::High => log::Level::Error,
            DebugSeverity::Medium => log::Level::Warn,
            DebugSeverity::Low | DebugSeverity::Unknown => log::Level::Info,
            DebugSeverity::Notification => log::Level::Debug,
        }
    }
}

/// One message captured from the driver's debug facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub kind: DebugType,
    pub severity: DebugSeverity,
    pub text: String,
}

impl DebugMessage {
    pub fn new(kind: DebugType, severity: DebugSeverity, text: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            text: text.into(),
        }
    }
}

impl fmt::Display for DebugMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] (importance: {}) {}",
            self.kind.as_str(),
            self.severity.as_str(),
            self.text
        )
    }
}

/// Forwards a driver message to the log. Never affects control flow.
pub fn log_debug_message(message: &DebugMessage) {
    log::log!(target: "gfx", message.severity.level(), "{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_type_and_importance() {
        let msg = DebugMessage::new(
            DebugType::UndefinedBehavior,
            DebugSeverity::Medium,
            "sampler bound to incomplete texture",
        );
        assert_eq!(
            msg.to_string(),
            "[UNDEFINED BEHAVIOR] (importance: medium) sampler bound to incomplete texture"
        );
    }

    #[test]
    fn severity_maps_to_level() {
        assert_eq!(DebugSeverity::High.level(), log::Level::Error);
        assert_eq!(DebugSeverity::Medium.level(), log::Level::Warn);
        assert_eq!(DebugSeverity::Notification.level(), log::Level::Debug);
    }

    #[test]
    fn group_markers_keep_their_names() {
        assert_eq!(DebugType::PushGroup.as_str(), "PUSH_GROUP");
        assert_eq!(DebugType::PopGroup.as_str(), "POP_GROUP");
    }
}
