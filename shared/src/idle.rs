//! # Idle Scheduler
//!
//! Work that must keep running while the main code busy-waits (most notably
//! the receive poll during send-and-wait) is registered as idle tasks.
//!
//! Each call to [`IdleScheduler::idle`] advances a counter modulo the
//! maximum frequency. A task of frequency `f` has period `max / f` and runs
//! when `counter % period == offset`. Offsets are chosen so that the
//! cumulated cost of tasks sharing a counter value stays low.

use heapless::Vec;

use crate::error::IdleError;

/// Something to run while waiting
pub trait Idle {
    fn idle(&mut self);
}

impl<F: FnMut()> Idle for F {
    fn idle(&mut self) {
        self()
    }
}

/// Periodic idle work
pub trait IdleTask {
    fn run(&mut self);
}

impl<F: FnMut()> IdleTask for F {
    fn run(&mut self) {
        self()
    }
}

/// Handle of a registered task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(u8);

struct Slot<'a> {
    task: &'a mut dyn IdleTask,
    period: u8,
    offset: u8,
    cost: u8,
    enabled: bool,
}

/// Fixed-capacity idle task scheduler
pub struct IdleScheduler<'a, const N: usize> {
    max_freq: u8,
    counter: u8,
    tasks: Vec<Slot<'a>, N>,
}

impl<'a, const N: usize> IdleScheduler<'a, N> {
    /// Scheduler where the fastest task runs on every call
    pub fn new(max_freq: u8) -> Result<Self, IdleError> {
        if max_freq == 0 {
            return Err(IdleError::InvalidFrequency);
        }
        Ok(Self {
            max_freq,
            counter: 0,
            tasks: Vec::new(),
        })
    }

    /// Register a task running `freq` times per `max_freq` calls
    ///
    /// `cost` is a relative weight used to spread tasks over counter values.
    pub fn add_task(&mut self, task: &'a mut dyn IdleTask, freq: u8, cost: u8) -> Result<TaskId, IdleError> {
        if freq == 0 {
            return Err(IdleError::InvalidFrequency);
        }
        if freq > self.max_freq {
            return Err(IdleError::FrequencyTooHigh {
                freq,
                max: self.max_freq,
            });
        }
        if self.max_freq % freq != 0 {
            return Err(IdleError::NotADivider {
                freq,
                max: self.max_freq,
            });
        }
        let period = self.max_freq / freq;
        let offset = self.least_loaded_offset(period);
        let id = TaskId(self.tasks.len() as u8);
        self.tasks
            .push(Slot {
                task,
                period,
                offset,
                cost,
                enabled: true,
            })
            .map_err(|_| IdleError::TooManyTasks)?;
        log::debug!("idle: task {} period {} offset {}", id.0, period, offset);
        Ok(id)
    }

    /// Offset in `0..period` whose counter values carry the least cost
    fn least_loaded_offset(&self, period: u8) -> u8 {
        let mut load = [0u32; 256];
        for slot in &self.tasks {
            let mut c = slot.offset as usize;
            while c < self.max_freq as usize {
                load[c] += slot.cost as u32;
                c += slot.period as usize;
            }
        }
        let mut best = (0u8, u32::MAX);
        for offset in 0..period {
            let total: u32 = (offset as usize..self.max_freq as usize)
                .step_by(period as usize)
                .map(|c| load[c])
                .sum();
            if total < best.1 {
                best = (offset, total);
            }
        }
        best.0
    }

    pub fn set_enabled(&mut self, id: TaskId, enabled: bool) -> Result<(), IdleError> {
        let slot = self.tasks.get_mut(id.0 as usize).ok_or(IdleError::UnknownTask)?;
        slot.enabled = enabled;
        Ok(())
    }

    /// Period and offset of a task
    pub fn schedule(&self, id: TaskId) -> Option<(u8, u8)> {
        self.tasks.get(id.0 as usize).map(|s| (s.period, s.offset))
    }

    /// Run the tasks due at the current counter value, then advance it
    pub fn idle(&mut self) {
        let counter = self.counter;
        for slot in self.tasks.iter_mut() {
            if slot.enabled && counter % slot.period == slot.offset {
                slot.task.run();
            }
        }
        self.counter = if counter + 1 >= self.max_freq { 0 } else { counter + 1 };
    }
}

impl<const N: usize> Idle for IdleScheduler<'_, N> {
    fn idle(&mut self) {
        IdleScheduler::idle(self)
    }
}
