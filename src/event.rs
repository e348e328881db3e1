//! # Event Bitmask
//!
//! The 16-bit event vector shared by [`crate::task`], [`crate::scheduler`]
//! and [`crate::kernel`]. Two bits are reserved for the system timers,
//! two more for the optional user ISRs; the rest are free for
//! application use.

use core::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of event bits. Newtype over `u16` so timer bits, ISR bits and
/// application bits can't be confused with a raw integer at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventMask(u16);

impl EventMask {
    /// The empty set — no events pending, no events waited on.
    pub const NONE: EventMask = EventMask(0);

    /// Posted when a task's absolute-timer deadline (`time_due_at`)
    /// is reached.
    pub const EVT_ABSOLUTE_TIMER: EventMask = EventMask(1 << 0);

    /// Posted when a task's relative delay (`cnt_delay`) reaches zero.
    pub const EVT_DELAY_TIMER: EventMask = EventMask(1 << 1);

    /// Reserved application event, conventionally posted by user ISR 0.
    pub const EVT_ISR_USER_00: EventMask = EventMask(1 << 2);

    /// Reserved application event, conventionally posted by user ISR 1.
    pub const EVT_ISR_USER_01: EventMask = EventMask(1 << 3);

    /// Both system-timer bits. `set_event` never posts any bit in this
    /// mask; only the timer tick handler does.
    pub const TIMER_BITS: EventMask =
        EventMask(Self::EVT_ABSOLUTE_TIMER.0 | Self::EVT_DELAY_TIMER.0);

    /// Build a mask from an application-chosen bit index (4..16).
    #[inline]
    pub const fn application_bit(index: u32) -> EventMask {
        EventMask(1 << index)
    }

    #[inline]
    pub const fn from_raw(bits: u16) -> EventMask {
        EventMask(bits)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: EventMask) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True if any bit of `other` is set in `self`.
    #[inline]
    pub const fn intersects(self, other: EventMask) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn without(self, other: EventMask) -> EventMask {
        EventMask(self.0 & !other.0)
    }
}

impl BitOr for EventMask {
    type Output = EventMask;
    #[inline]
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    #[inline]
    fn bitor_assign(&mut self, rhs: EventMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = EventMask;
    #[inline]
    fn bitand(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_bits_are_distinct() {
        let all = [
            EventMask::EVT_ABSOLUTE_TIMER,
            EventMask::EVT_DELAY_TIMER,
            EventMask::EVT_ISR_USER_00,
            EventMask::EVT_ISR_USER_01,
        ];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert!(!a.intersects(*b));
                }
            }
        }
    }

    #[test]
    fn timer_bits_mask_covers_both() {
        assert!(EventMask::TIMER_BITS.contains(EventMask::EVT_ABSOLUTE_TIMER));
        assert!(EventMask::TIMER_BITS.contains(EventMask::EVT_DELAY_TIMER));
        assert!(!EventMask::TIMER_BITS.contains(EventMask::EVT_ISR_USER_00));
    }

    #[test]
    fn without_strips_only_named_bits() {
        let mask = EventMask::EVT_DELAY_TIMER | EventMask::application_bit(5);
        let stripped = mask.without(EventMask::TIMER_BITS);
        assert!(!stripped.contains(EventMask::EVT_DELAY_TIMER));
        assert!(stripped.contains(EventMask::application_bit(5)));
    }

    #[test]
    fn contains_is_vacuously_true_for_empty_subset() {
        let mask = EventMask::NONE;
        assert!(EventMask::application_bit(7).contains(mask));
    }
}
