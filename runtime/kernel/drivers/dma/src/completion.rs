// Licensed under the Apache-2.0 license.

//! In-process interrupt channel.
//!
//! [`IrqChannel`] gives the semantics of a Linux UIO interrupt file to a
//! device model running in the same process: the device side drives an
//! [`IrqLine`], the driver side blocks in [`Completion::wait`] and re-arms
//! with [`Completion::acknowledge`].

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::hil::Completion;

#[derive(Debug, Default)]
struct IrqState {
    /// Level the device currently drives.
    level: bool,
    /// An interrupt has been delivered but not yet consumed by `wait`.
    pending: bool,
    /// Delivery is disabled until the next `acknowledge`.
    masked: bool,
}

/// Driver end of an interrupt line.
///
/// The channel starts masked; the first `acknowledge` arms it.
#[derive(Debug)]
pub struct IrqChannel {
    state: Mutex<IrqState>,
    signal: Condvar,
}

impl IrqChannel {
    pub fn new() -> Arc<IrqChannel> {
        Arc::new(IrqChannel {
            state: Mutex::new(IrqState {
                masked: true,
                ..Default::default()
            }),
            signal: Condvar::new(),
        })
    }

    /// Device end of this channel.
    pub fn line(self: &Arc<Self>) -> IrqLine {
        IrqLine {
            channel: Arc::clone(self),
        }
    }

    /// `true` if an interrupt is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    fn lock(&self) -> MutexGuard<'_, IrqState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, state: &mut IrqState) {
        if !state.masked {
            state.pending = true;
            self.signal.notify_all();
        }
    }
}

impl Completion for IrqChannel {
    fn wait(&self) -> io::Result<()> {
        let mut state = self.lock();
        while !state.pending {
            state = self
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.pending = false;
        state.masked = true;
        Ok(())
    }

    fn acknowledge(&self) -> io::Result<()> {
        let mut state = self.lock();
        state.masked = false;
        if state.level {
            self.deliver(&mut state);
        }
        Ok(())
    }
}

/// Device end of an interrupt line.
#[derive(Debug, Clone)]
pub struct IrqLine {
    channel: Arc<IrqChannel>,
}

impl IrqLine {
    /// Drive the line. A rising level notifies the driver unless it is masked;
    /// dropping the level withdraws an interrupt that was not consumed yet.
    pub fn set_level(&self, level: bool) {
        let mut state = self.channel.lock();
        let rising = level && !state.level;
        state.level = level;
        if rising {
            self.channel.deliver(&mut state);
        } else if !level {
            state.pending = false;
        }
    }

    /// Deliver one edge without asserting the level.
    pub fn pulse(&self) {
        let mut state = self.channel.lock();
        self.channel.deliver(&mut state);
    }

    pub fn level(&self) -> bool {
        self.channel.lock().level
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_interrupt_before_arming_is_held_by_level() {
        let channel = IrqChannel::new();
        let line = channel.line();

        line.set_level(true);
        assert!(!channel.is_pending());

        channel.acknowledge().unwrap();
        assert!(channel.is_pending());
        channel.wait().unwrap();
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_wait_masks_until_acknowledge() {
        let channel = IrqChannel::new();
        let line = channel.line();
        channel.acknowledge().unwrap();

        line.set_level(true);
        channel.wait().unwrap();

        // Still asserted: the line must not fire again until re-armed.
        line.set_level(true);
        assert!(!channel.is_pending());

        // Source cleared before re-arming: nothing left to deliver.
        line.set_level(false);
        channel.acknowledge().unwrap();
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_acknowledge_with_level_high_redelivers() {
        let channel = IrqChannel::new();
        let line = channel.line();
        channel.acknowledge().unwrap();

        line.set_level(true);
        channel.wait().unwrap();
        channel.acknowledge().unwrap();
        assert!(channel.is_pending());
    }

    #[test]
    fn test_wait_blocks_until_raised_from_other_thread() {
        let channel = IrqChannel::new();
        let line = channel.line();
        channel.acknowledge().unwrap();

        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            line.set_level(true);
        });
        channel.wait().unwrap();
        raiser.join().unwrap();
    }

    #[test]
    fn test_pulse_leaves_level_low() {
        let channel = IrqChannel::new();
        let line = channel.line();
        channel.acknowledge().unwrap();

        line.pulse();
        assert!(!line.level());
        channel.wait().unwrap();
        channel.acknowledge().unwrap();
        assert!(!channel.is_pending());
    }
}
