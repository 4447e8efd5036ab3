use std::time::{Duration, Instant};

/// A structure to manage progress reporting of transfers to the device.
///
/// This struct stores a handler closure which will be called every time an event happens
/// while a core is erased or programmed.
///
/// # Example
///
/// ```
/// use nvmprog::flashing::FlashProgress;
///
/// // Print events
/// let progress = FlashProgress::new(|event| println!("Event: {:#?}", event));
/// ```
pub struct FlashProgress {
    handler: Box<dyn Fn(ProgressEvent)>,
}

impl FlashProgress {
    /// Create a new `FlashProgress` structure with a given `handler` to be called on events.
    pub fn new(handler: impl Fn(ProgressEvent) + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// A `FlashProgress` that drops every event.
    pub fn empty() -> Self {
        Self::new(|_| {})
    }

    /// Emit a progress event.
    fn emit(&self, event: ProgressEvent) {
        (self.handler)(event);
    }

    /// Starts reporting a transfer of kind `operation` to `core`.
    ///
    /// The returned stream emits exactly one terminal event: either through
    /// [`TransferProgress::finish`] or [`TransferProgress::fail`], or a failure when it is
    /// dropped without either being called.
    pub fn start(&self, core: &str, operation: TransferKind) -> TransferProgress<'_> {
        self.emit(ProgressEvent::Started {
            core: core.to_owned(),
            operation,
        });
        TransferProgress {
            progress: self,
            core: core.to_owned(),
            operation,
            started: Instant::now(),
            last_percentage: 0,
            terminated: false,
        }
    }
}

impl Default for FlashProgress {
    fn default() -> Self {
        Self::empty()
    }
}

/// The progress stream of a single transfer to a single core.
pub struct TransferProgress<'a> {
    progress: &'a FlashProgress,
    core: String,
    operation: TransferKind,
    started: Instant,
    last_percentage: u8,
    terminated: bool,
}

impl TransferProgress<'_> {
    /// The core this transfer goes to.
    pub fn core(&self) -> &str {
        &self.core
    }

    /// Reports the transfer as `percentage` complete.
    ///
    /// The percentage is clamped to 100 and never goes backwards.
    pub fn update(&mut self, percentage: u8, message: impl Into<String>) {
        let percentage = percentage.min(100).max(self.last_percentage);
        self.last_percentage = percentage;
        self.progress.emit(ProgressEvent::Progress {
            core: self.core.clone(),
            operation: self.operation,
            percentage,
            message: message.into(),
        });
    }

    /// Ends the stream successfully.
    pub fn finish(mut self) {
        self.terminate(None);
    }

    /// Ends the stream with a failure.
    pub fn fail(mut self, message: impl Into<String>) {
        self.terminate(Some(message.into()));
    }

    fn terminate(&mut self, failure: Option<String>) {
        self.terminated = true;
        let core = self.core.clone();
        let operation = self.operation;
        let time = self.started.elapsed();
        self.progress.emit(match failure {
            None => ProgressEvent::Finished {
                core,
                operation,
                time,
            },
            Some(message) => ProgressEvent::Failed {
                core,
                operation,
                message,
            },
        });
    }
}

impl Drop for TransferProgress<'_> {
    fn drop(&mut self) {
        if !self.terminated {
            self.terminate(Some("The transfer was aborted.".to_owned()));
        }
    }
}

/// What is being transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// A core is erased.
    Erase,
    /// A core is programmed.
    Program,
}

/// Possible events during a transfer.
///
/// Every transfer produces `Started`, any number of `Progress` events and then exactly
/// one of `Finished` or `Failed`. No further events follow for that transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The transfer has started.
    Started {
        /// The core that is transferred to.
        core: String,
        /// What is being done.
        operation: TransferKind,
    },
    /// The transfer has made progress.
    Progress {
        /// The core that is transferred to.
        core: String,
        /// What is being done.
        operation: TransferKind,
        /// How much of the transfer is complete, 0 to 100.
        percentage: u8,
        /// A human readable description of the current step.
        message: String,
    },
    /// The transfer completed successfully.
    Finished {
        /// The core that was transferred to.
        core: String,
        /// What was done.
        operation: TransferKind,
        /// The time the whole transfer took.
        time: Duration,
    },
    /// The transfer failed.
    Failed {
        /// The core that was transferred to.
        core: String,
        /// What was attempted.
        operation: TransferKind,
        /// Why it failed.
        message: String,
    },
}

impl ProgressEvent {
    /// Returns true for `Finished` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Finished { .. } | ProgressEvent::Failed { .. }
        )
    }
}
