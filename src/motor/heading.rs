// Heading fed in from outside the process (an IMU node publishing on zenoh)

use tracing::warn;

use super::actuator::HeadingSensor;
use crate::error::Result;
use crate::swerve::Angle;

/// Holds the most recent heading sample
///
/// Until the first sample arrives it reports zero, so odometry runs as if the
/// robot started facing the field +x axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatchedHeading {
    latest: Option<Angle>,
    warned: bool,
}

impl LatchedHeading {
    pub fn latch(&mut self, heading: Angle) {
        self.latest = Some(heading.wrapped());
    }

    pub fn has_sample(&self) -> bool {
        self.latest.is_some()
    }
}

impl HeadingSensor for LatchedHeading {
    fn heading(&mut self) -> Result<Angle> {
        match self.latest {
            Some(heading) => Ok(heading),
            None => {
                if !self.warned {
                    warn!("No heading sample yet, assuming 0°");
                    self.warned = true;
                }
                Ok(Angle::ZERO)
            }
        }
    }
}
