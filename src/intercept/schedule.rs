//! Failure schedules: which future calls of an operation fail.
//!
//! A [`FailureSchedule`] holds a pattern of fail/pass slots and a cursor.
//! Every dispatched call consumes exactly one slot, whatever the outcome.
//! What happens once the pattern is exhausted is chosen by [`ScheduleEnd`].

use super::error::ConfigError;

/// Never fail.
pub const FAIL_NEVER: u32 = 0;
/// Fail the first call only.
pub const FAIL_FIRST: u32 = 0b1;
/// Fail the second call only.
pub const FAIL_SECOND: u32 = 0b10;
/// Fail the third call only.
pub const FAIL_THIRD: u32 = 0b100;
/// Fail the first two calls.
pub const FAIL_TWICE: u32 = 0b11;
/// Fail every call, forever.
pub const FAIL_ALWAYS: u32 = u32::MAX;

/// Behaviour once the pattern has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleEnd {
    /// Every later call passes through.
    #[default]
    Pass,
    /// Start over from the first slot.
    Wrap,
    /// Keep repeating the last slot.
    Clamp,
}

/// Per-operation failure plan.
///
/// `scripted` is what a failing call hands back instead of running the
/// operation: a null pointer, an errno, a resolver error code.
#[derive(Debug, Clone)]
pub struct FailureSchedule<R> {
    pattern: Vec<bool>,
    cursor: usize,
    end: ScheduleEnd,
    scripted: R,
}

impl<R: Clone> FailureSchedule<R> {
    /// A schedule that never fails.
    pub fn never(scripted: R) -> Self {
        Self {
            pattern: Vec::new(),
            cursor: 0,
            end: ScheduleEnd::Pass,
            scripted,
        }
    }

    /// Build a schedule from an explicit pattern (`true` = fail).
    pub fn new(pattern: Vec<bool>, end: ScheduleEnd, scripted: R) -> Result<Self, ConfigError> {
        let mut schedule = Self::never(scripted);
        schedule.set_pattern(pattern, end)?;
        Ok(schedule)
    }

    /// Build a schedule from a bit mask, one bit per call, least
    /// significant bit first. [`FAIL_ALWAYS`] never runs out.
    pub fn from_bits(mask: u32, scripted: R) -> Self {
        let mut schedule = Self::never(scripted);
        schedule.set_bits(mask);
        schedule
    }

    /// Replace the pattern and rewind the cursor.
    pub fn set_pattern(&mut self, pattern: Vec<bool>, end: ScheduleEnd) -> Result<(), ConfigError> {
        if pattern.is_empty() && end != ScheduleEnd::Pass {
            return Err(ConfigError::EmptyPattern);
        }
        self.pattern = pattern;
        self.end = end;
        self.cursor = 0;
        Ok(())
    }

    /// Replace the pattern with a bit mask and rewind the cursor.
    pub fn set_bits(&mut self, mask: u32) {
        if mask == FAIL_ALWAYS {
            self.pattern = vec![true];
            self.end = ScheduleEnd::Clamp;
        } else {
            let len = (u32::BITS - mask.leading_zeros()) as usize;
            self.pattern = (0..len).map(|i| mask & (1 << i) != 0).collect();
            self.end = ScheduleEnd::Pass;
        }
        self.cursor = 0;
    }

    /// Replace the value handed back by failing calls.
    pub fn set_scripted(&mut self, scripted: R) {
        self.scripted = scripted;
    }

    pub fn scripted(&self) -> &R {
        &self.scripted
    }

    /// Consume one slot. Returns the scripted result if this call fails.
    pub fn next(&mut self) -> Option<R> {
        let fail = self.peek();
        self.cursor += 1;
        fail.then(|| self.scripted.clone())
    }

    /// Whether the next call would fail, without consuming it.
    pub fn peek(&self) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        match self.end {
            _ if self.cursor < self.pattern.len() => self.pattern[self.cursor],
            ScheduleEnd::Pass => false,
            ScheduleEnd::Wrap => self.pattern[self.cursor % self.pattern.len()],
            ScheduleEnd::Clamp => self.pattern[self.pattern.len() - 1],
        }
    }

    /// Number of calls dispatched through this schedule.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Rewind to the first slot, keeping the pattern.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Drop the pattern: never fail again.
    pub fn clear(&mut self) {
        self.pattern.clear();
        self.end = ScheduleEnd::Pass;
        self.cursor = 0;
    }
}
