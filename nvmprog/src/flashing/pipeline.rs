use std::fmt;

use nvmprog_target::{DeviceDefinition, ProtectionStatus};

use super::{FlashError, FlashProgress, TransferKind, WritePlan};
use crate::memory::{OverlapMap, PAD_BYTE};
use crate::probe::{ProbeDriver, ProbeError};

/// The states a core goes through while it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Nothing is happening.
    Idle,
    /// The write plan is being computed.
    Planning,
    /// The plan is being sent to the probe.
    Transferring,
    /// The core is read back and compared to the plan.
    Verifying,
    /// The plan was empty, nothing was sent.
    Skipped,
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How writing a single core ended.
#[derive(Debug)]
pub enum CoreOutcome {
    /// The plan was transferred.
    Written {
        /// Number of pages written.
        pages: usize,
        /// Number of bytes written.
        bytes: u64,
        /// Whether the data was read back and matched. Protected cores can not be
        /// read back.
        verified: bool,
    },
    /// There was nothing to write to this core.
    Skipped,
    /// Writing the core failed. No further cores were attempted.
    Failed(FlashError),
}

/// What happened to one core during a write.
#[derive(Debug)]
pub struct CoreReport {
    /// Name of the core.
    pub core: String,
    /// Every state the core went through, starting and ending with [`WriteState::Idle`].
    pub transitions: Vec<WriteState>,
    /// How it ended.
    pub outcome: CoreOutcome,
}

/// The result of writing to all cores of a device.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// One report per attempted core, in the order the cores were written.
    pub cores: Vec<CoreReport>,
}

impl WriteReport {
    /// Returns true if no core failed.
    pub fn is_success(&self) -> bool {
        !self
            .cores
            .iter()
            .any(|c| matches!(c.outcome, CoreOutcome::Failed(_)))
    }

    /// The report of a core.
    pub fn core(&self, name: &str) -> Option<&CoreReport> {
        self.cores.iter().find(|c| c.core == name)
    }

    /// Converts the first failure into an error.
    pub fn into_result(self) -> Result<WriteReport, FlashError> {
        let mut cores = Vec::with_capacity(self.cores.len());
        for core in self.cores {
            match core.outcome {
                CoreOutcome::Failed(error) => return Err(error),
                outcome => cores.push(CoreReport { outcome, ..core }),
            }
        }
        Ok(WriteReport { cores })
    }
}

/// Tracks the state transitions of a single core.
struct CoreStateMachine {
    core: String,
    transitions: Vec<WriteState>,
}

impl CoreStateMachine {
    fn new(core: &str) -> Self {
        Self {
            core: core.to_owned(),
            transitions: vec![WriteState::Idle],
        }
    }

    fn enter(&mut self, state: WriteState) {
        tracing::trace!("Core '{}' enters {}", self.core, state);
        self.transitions.push(state);
    }

    fn finish(mut self, outcome: CoreOutcome) -> CoreReport {
        self.enter(WriteState::Idle);
        CoreReport {
            core: self.core,
            transitions: self.transitions,
            outcome,
        }
    }
}

/// Writes merged firmware to all cores of a device, one core at a time in declared order.
///
/// The pipeline stops at the first core that fails. A core whose protection status could
/// not be determined is never transferred to and counts as failed.
pub struct WritePipeline<'a, P: ProbeDriver + ?Sized> {
    probe: &'a mut P,
    progress: &'a FlashProgress,
    verify: bool,
}

impl<'a, P: ProbeDriver + ?Sized> WritePipeline<'a, P> {
    /// Creates a pipeline that writes through `probe` and reports to `progress`.
    pub fn new(probe: &'a mut P, progress: &'a FlashProgress) -> Self {
        Self {
            probe,
            progress,
            verify: true,
        }
    }

    /// Enables or disables reading back each written core.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Runs the pipeline.
    pub fn run(&mut self, device: &DeviceDefinition, overlaps: &OverlapMap) -> WriteReport {
        let mut report = WriteReport::default();

        for core in &device.cores {
            let mut state = CoreStateMachine::new(&core.name);

            state.enter(WriteState::Planning);
            let plan = WritePlan::new(overlaps, core);

            if plan.is_empty() {
                tracing::info!("No data to write to core '{}', skipping", core.name);
                state.enter(WriteState::Skipped);
                report.cores.push(state.finish(CoreOutcome::Skipped));
                continue;
            }

            tracing::info!(
                "Writing {} bytes in {} pages to {}",
                plan.byte_len(),
                plan.pages().len(),
                device.core_address(core)
            );

            if core.protection_status == ProtectionStatus::Unknown {
                let error = FlashError::ProtectionUnknown {
                    core: core.name.clone(),
                };
                tracing::error!("{}", error);
                report.cores.push(state.finish(CoreOutcome::Failed(error)));
                break;
            }

            state.enter(WriteState::Transferring);
            if let Err(error) = self.transfer(&plan) {
                tracing::error!("Writing core '{}' failed: {}", core.name, error);
                report.cores.push(state.finish(CoreOutcome::Failed(error)));
                break;
            }

            let mut verified = false;
            if self.verify {
                state.enter(WriteState::Verifying);
                match self.verify_core(&plan) {
                    Ok(matches) => verified = matches,
                    Err(error) => {
                        tracing::error!("Verifying core '{}' failed: {}", core.name, error);
                        report.cores.push(state.finish(CoreOutcome::Failed(error)));
                        break;
                    }
                }
            }

            report.cores.push(state.finish(CoreOutcome::Written {
                pages: plan.pages().len(),
                bytes: plan.byte_len(),
                verified,
            }));
        }

        report
    }

    fn transfer(&mut self, plan: &WritePlan) -> Result<(), FlashError> {
        let hex = plan.to_hex()?;

        let mut transfer = self.progress.start(plan.core(), TransferKind::Program);
        match self.probe.program_core(plan.core(), &hex, &mut transfer) {
            Ok(()) => {
                transfer.finish();
                Ok(())
            }
            Err(source) => {
                transfer.fail(source.to_string());
                Err(FlashError::Probe {
                    core: plan.core().to_owned(),
                    source,
                })
            }
        }
    }

    /// Reads the core back and compares it with the plan.
    ///
    /// Returns `Ok(false)` if the core can not be read because it is protected.
    fn verify_core(&mut self, plan: &WritePlan) -> Result<bool, FlashError> {
        let memory = match self.probe.read_memory(plan.core()) {
            Ok(memory) => memory,
            Err(ProbeError::Protected(_)) => {
                tracing::info!(
                    "Core '{}' is protected, skipping verification",
                    plan.core()
                );
                return Ok(false);
            }
            Err(source) => {
                return Err(FlashError::Probe {
                    core: plan.core().to_owned(),
                    source,
                })
            }
        };

        for page in plan.pages() {
            let actual = memory.slice_pad(page.address(), page.data().len(), PAD_BYTE);
            if let Some(offset) = actual.iter().zip(page.data()).position(|(a, b)| a != b) {
                return Err(FlashError::ProgrammingFailed {
                    core: plan.core().to_owned(),
                    message: format!(
                        "verification failed at address {:#010X}",
                        page.address() + offset as u64
                    ),
                });
            }
        }

        tracing::debug!("Verified core '{}'", plan.core());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SparseMemoryMap;
    use crate::probe::{FakeProbe, Operation};
    use nvmprog_target::{CoreDefinition, DeviceFamily, ProtectionStatus};
    use pretty_assertions::assert_eq;

    fn family() -> DeviceFamily {
        let core = |name: &str, core_number, rom_base_addr, uicr_base_addr, page_size| {
            CoreDefinition {
                name: name.to_owned(),
                core_number,
                rom_base_addr,
                rom_size: 0x4_0000,
                uicr_base_addr,
                page_size,
                protection_status: ProtectionStatus::None,
            }
        };
        DeviceFamily {
            name: "nRF53".to_owned(),
            cores: vec![
                core("Application", 0, 0x0, 0x00FF_8000, 0x1000),
                core("Network", 1, 0x0100_0000, 0x01FF_8000, 0x800),
            ],
        }
    }

    fn device() -> DeviceDefinition {
        let family = family();
        family
            .cores
            .into_iter()
            .fold(DeviceDefinition::new("960012345", family.name), |d, c| {
                d.with_core(c)
            })
    }

    #[test]
    fn cores_without_data_are_skipped() {
        let mut probe = FakeProbe::new("960012345", &family());
        let image = SparseMemoryMap::from_ranges([(0x1000, vec![1; 16])]).unwrap();
        let progress = FlashProgress::empty();

        let report =
            WritePipeline::new(&mut probe, &progress).run(&device(), &OverlapMap::from(&image));

        assert!(report.is_success());
        assert_eq!(
            report.core("Application").unwrap().transitions,
            vec![
                WriteState::Idle,
                WriteState::Planning,
                WriteState::Transferring,
                WriteState::Verifying,
                WriteState::Idle
            ]
        );
        assert_eq!(
            report.core("Network").unwrap().transitions,
            vec![
                WriteState::Idle,
                WriteState::Planning,
                WriteState::Skipped,
                WriteState::Idle
            ]
        );
        assert!(!probe
            .operations()
            .iter()
            .any(|(_, core)| core == "Network"));
    }

    #[test]
    fn failure_stops_the_pipeline() {
        let mut probe = FakeProbe::new("960012345", &family());
        probe.fail(Operation::Program, "Application");
        let image = SparseMemoryMap::from_ranges([
            (0x1000, vec![1; 16]),
            (0x0100_1000, vec![2; 16]),
        ])
        .unwrap();
        let progress = FlashProgress::empty();

        let report =
            WritePipeline::new(&mut probe, &progress).run(&device(), &OverlapMap::from(&image));

        assert!(!report.is_success());
        assert_eq!(report.cores.len(), 1);
        assert_eq!(
            report.cores[0].transitions,
            vec![
                WriteState::Idle,
                WriteState::Planning,
                WriteState::Transferring,
                WriteState::Idle
            ]
        );
        assert!(matches!(
            report.into_result(),
            Err(FlashError::Probe { core, .. }) if core == "Application"
        ));
    }

    #[test]
    fn core_with_unknown_protection_is_not_transferred() {
        let mut probe = FakeProbe::new("960012345", &family());
        let image = SparseMemoryMap::from_ranges([
            (0x1000, vec![1; 16]),
            (0x0100_1000, vec![2; 16]),
        ])
        .unwrap();
        let mut device = device();
        device.cores[1].protection_status = ProtectionStatus::Unknown;
        let progress = FlashProgress::empty();

        let report =
            WritePipeline::new(&mut probe, &progress).run(&device, &OverlapMap::from(&image));

        assert!(!report.is_success());
        assert_eq!(
            report.core("Network").unwrap().transitions,
            vec![WriteState::Idle, WriteState::Planning, WriteState::Idle]
        );
        assert!(matches!(
            &report.core("Network").unwrap().outcome,
            CoreOutcome::Failed(FlashError::ProtectionUnknown { core }) if core == "Network"
        ));
        assert_eq!(
            probe.operations(),
            &[
                (Operation::Program, "Application".to_owned()),
                (Operation::Read, "Application".to_owned()),
            ]
        );
    }

    #[test]
    fn protected_core_is_written_but_not_verified() {
        let mut probe = FakeProbe::new("960012345", &family());
        probe.set_protected("Network", true).unwrap();
        let image = SparseMemoryMap::from_ranges([(0x0100_0000, vec![2; 16])]).unwrap();
        let progress = FlashProgress::empty();

        let report =
            WritePipeline::new(&mut probe, &progress).run(&device(), &OverlapMap::from(&image));

        assert!(matches!(
            report.core("Network").unwrap().outcome,
            CoreOutcome::Written {
                pages: 1,
                bytes: 16,
                verified: false
            }
        ));
    }
}
