// Tones
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::time::{Duration, SystemTime, SystemTimeError};

/// The logical time of a run, measured against an epoch.
#[derive(Debug, Clone, Copy)]
pub(super) struct Timeline {
    epoch: SystemTime,
    logical: SystemTime,
    ahead_by: Duration,
}

impl Timeline {
    /// Starts `ahead_by` in front of the wall clock. Without an epoch, playback time counts
    /// from the start.
    pub(super) fn start(epoch: Option<SystemTime>, ahead_by: Duration) -> Timeline {
        Timeline::starting_at(SystemTime::now() + ahead_by, epoch, ahead_by)
    }

    fn starting_at(logical: SystemTime, epoch: Option<SystemTime>, ahead_by: Duration) -> Timeline {
        Timeline {
            epoch: epoch.unwrap_or(logical),
            logical,
            ahead_by,
        }
    }

    /// Seconds from the epoch to the logical time, negative before the epoch.
    pub(super) fn seconds(&self) -> f64 {
        match self.logical.duration_since(self.epoch) {
            Ok(elapsed) => elapsed.as_secs_f64(),
            Err(err) => -err.duration().as_secs_f64(),
        }
    }

    pub(super) fn step(&mut self, tick: Duration) {
        self.logical += tick;
    }

    /// How long to sleep until the wall clock is `ahead_by` behind the logical time again.
    ///
    /// Fails once the wall clock has caught up.
    pub(super) fn wait(&self) -> Result<Duration, SystemTimeError> {
        self.logical.duration_since(SystemTime::now() + self.ahead_by)
    }
}
