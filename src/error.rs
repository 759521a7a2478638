//! Error taxonomy shared by generation, orchestration and rendering.

/// Everything that can go wrong between configuration and a presented frame.
#[derive(thiserror::Error, Debug)]
pub enum CloudscapeError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("resource initialization failed: {0}")]
    ResourceInit(String),

    #[error("capacity exceeded: {requested} points do not fit a region of {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("device error during {pass}: {message}")]
    Device { pass: &'static str, message: String },

    #[error("pass ordering violated: {0}")]
    PipelineOrder(String),

    #[error("device reported errors on {frames} consecutive frames, last: {last}")]
    RepeatedDeviceFailure { frames: u32, last: String },
}

impl CloudscapeError {
    pub fn invalid<T: ToString>(msg: T) -> Self {
        CloudscapeError::InvalidParameter(msg.to_string())
    }

    pub fn resource<T: ToString>(msg: T) -> Self {
        CloudscapeError::ResourceInit(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CloudscapeError>;

/// Counts consecutive frames whose passes reported device errors.
///
/// A single bad frame is logged and forgotten. A streak longer than the
/// configured limit means the configuration itself is broken and is handed
/// back to the caller instead of being logged forever.
#[derive(Debug, Clone)]
pub struct DeviceFailureMonitor {
    max_consecutive: u32,
    consecutive: u32,
    last_message: Option<String>,
}

impl DeviceFailureMonitor {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive: max_consecutive.max(1),
            consecutive: 0,
            last_message: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Feed the device errors seen during one frame.
    pub fn record_frame(&mut self, errors: &[CloudscapeError]) -> Result<()> {
        if errors.is_empty() {
            if self.consecutive > 0 {
                log::info!("device recovered after {} failing frame(s)", self.consecutive);
            }
            self.consecutive = 0;
            self.last_message = None;
            return Ok(());
        }

        self.consecutive += 1;
        self.last_message = errors.last().map(|e| e.to_string());
        if self.consecutive >= self.max_consecutive {
            return Err(CloudscapeError::RepeatedDeviceFailure {
                frames: self.consecutive,
                last: self.last_message.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }
}
