//! Control line sequences
//!
//! On K210 boards DTR drives the boot-mode strap (IO16) and RTS drives the
//! reset line. Holding IO16 low across a reset pulse starts the bootrom in ISP
//! mode; releasing it lets the chip boot from flash.

use std::time::Duration;

use super::{ProtocolError, Transport};

/// Levels for one step of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLines {
    pub dtr: bool,
    pub rts: bool,
}

const fn lines(dtr: bool, rts: bool) -> ControlLines {
    ControlLines { dtr, rts }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSequence {
    /// Reset with the strap held, leaving the bootrom waiting for ISP commands
    EnterIsp,
    /// Reset with the strap released, running the flashed firmware
    RunFirmware,
}

impl ResetSequence {
    pub fn steps(&self) -> &'static [ControlLines] {
        const ENTER_ISP: [ControlLines; 3] = [
            lines(false, false),
            // Reset low, IO16 high
            lines(false, true),
            // IO16 low, reset released
            lines(true, false),
        ];
        const RUN_FIRMWARE: [ControlLines; 3] = [
            lines(false, false),
            lines(false, true),
            lines(false, false),
        ];

        match self {
            ResetSequence::EnterIsp => &ENTER_ISP,
            ResetSequence::RunFirmware => &RUN_FIRMWARE,
        }
    }

    /// Apply every step, waiting `settle` after each one
    pub async fn run<T: Transport>(
        &self,
        transport: &mut T,
        settle: Duration,
    ) -> Result<(), ProtocolError> {
        tracing::debug!(sequence = ?self, "driving control lines");
        for step in self.steps() {
            transport.set_control_lines(step.dtr, step.rts).await?;
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct LineRecorder {
        levels: Vec<(bool, bool)>,
    }

    impl Transport for LineRecorder {
        async fn read(&mut self) -> Result<Vec<u8>, ProtocolError> {
            Err(ProtocolError::Timeout)
        }

        async fn write(&mut self, _data: &[u8]) -> Result<(), ProtocolError> {
            Ok(())
        }

        async fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<(), ProtocolError> {
            self.levels.push((dtr, rts));
            Ok(())
        }

        async fn reopen(&mut self, _baud_rate: u32) -> Result<(), ProtocolError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }

        fn baud_rate(&self) -> u32 {
            115_200
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_isp_sequence() {
        let mut recorder = LineRecorder::default();
        let start = tokio::time::Instant::now();
        ResetSequence::EnterIsp
            .run(&mut recorder, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(
            recorder.levels,
            vec![(false, false), (false, true), (true, false)]
        );
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_firmware_releases_strap() {
        let mut recorder = LineRecorder::default();
        ResetSequence::RunFirmware
            .run(&mut recorder, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(recorder.levels.last(), Some(&(false, false)));
        assert!(recorder.levels.iter().all(|&(dtr, _)| !dtr));
    }
}
