/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    /// A camera driver failure; the booth cannot run without its camera
    Fatal(String),
    UserRequest,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Fatal(_) => 1,
            _ => 0,
        }
    }
}

/// Operator input collected between two ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonPressed,
    /// Send the current preview frame to the printer
    PrintPreview,
    Quit,
}
