/// Lifecycle of an encoder process pipe.
///
/// State transitions:
/// ```text
/// not_started → running → stopping → stopped
///      ↑___________|  (failed start)
/// ```
/// A stopped pipe may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl PipeState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether `start` may be called from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Stopped)
    }

    /// Whether the transition `self → next` is legal.
    pub fn can_transition_to(&self, next: PipeState) -> bool {
        use PipeState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Stopped, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Running, Stopped)
                | (NotStarted, Stopped)
        )
    }
}

/// What the recorder's foreground session is doing.
///
/// Saving runs in the background and is tracked separately, so a new
/// capture can start while the previous one is still being muxed.
///
/// ```text
/// idle → capturing → idle
///   ↓         ↑
/// playing_back
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Capturing,
    PlayingBack,
}

impl SessionPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_playing_back(&self) -> bool {
        matches!(self, Self::PlayingBack)
    }
}
