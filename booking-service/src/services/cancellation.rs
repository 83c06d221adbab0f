//! Cancellation charge calculator.
//!
//! Charges depend on who cancels and how close to the committed slot the
//! cancellation lands. The amounts are domain policy constants.

use chrono::NaiveDateTime;

use crate::models::{CancelledBy, ScheduleSlot};

/// Customer cancelling within the last hour.
pub const CUSTOMER_LATE_CHARGE_PAISE: i64 = 10_000;
/// Partner cancelling within the last hour.
pub const PARTNER_LAST_HOUR_CHARGE_PAISE: i64 = 25_000;
/// Partner cancelling between one and three hours out.
pub const PARTNER_LATE_CHARGE_PAISE: i64 = 15_000;
/// Beyond this horizon a partner cancellation still leaves time to re-offer
/// the job as a child booking.
pub const RESCHEDULE_CUTOFF_HOURS: f64 = 3.0;

/// Hours from `now` until the committed slot; negative when the slot has
/// already passed.
pub fn hours_until(slot: &ScheduleSlot, now: NaiveDateTime) -> anyhow::Result<f64> {
    let at = slot.resolve()?;
    Ok((at - now).num_minutes() as f64 / 60.0)
}

/// Charge levied on the cancelling party.
pub fn charge_paise(party: CancelledBy, hours_until_service: f64) -> i64 {
    match party {
        CancelledBy::Customer => {
            if hours_until_service <= 1.0 {
                CUSTOMER_LATE_CHARGE_PAISE
            } else {
                0
            }
        }
        CancelledBy::Partner => {
            if hours_until_service <= 1.0 {
                PARTNER_LAST_HOUR_CHARGE_PAISE
            } else if hours_until_service <= RESCHEDULE_CUTOFF_HOURS {
                PARTNER_LATE_CHARGE_PAISE
            } else {
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Meridiem;

    #[test]
    fn customer_charges() {
        assert_eq!(charge_paise(CancelledBy::Customer, 0.5), 10_000);
        assert_eq!(charge_paise(CancelledBy::Customer, 1.0), 10_000);
        assert_eq!(charge_paise(CancelledBy::Customer, 2.0), 0);
    }

    #[test]
    fn partner_charges() {
        assert_eq!(charge_paise(CancelledBy::Partner, 0.9), 25_000);
        assert_eq!(charge_paise(CancelledBy::Partner, 2.0), 15_000);
        assert_eq!(charge_paise(CancelledBy::Partner, 3.0), 15_000);
        assert_eq!(charge_paise(CancelledBy::Partner, 4.0), 0);
    }

    #[test]
    fn a_slot_already_past_charges_at_the_maximum_tier() {
        assert_eq!(charge_paise(CancelledBy::Customer, -2.0), 10_000);
        assert_eq!(charge_paise(CancelledBy::Partner, -0.5), 25_000);
    }

    #[test]
    fn hours_until_spans_the_slot() {
        let slot = ScheduleSlot {
            date: "2026-03-14".parse().unwrap(),
            time: "04:00".to_string(),
            meridiem: Meridiem::Pm,
        };
        let now = "2026-03-14T13:30:00".parse::<NaiveDateTime>().unwrap();
        let hours = hours_until(&slot, now).unwrap();
        assert!((hours - 2.5).abs() < f64::EPSILON);

        let later = "2026-03-14T17:00:00".parse::<NaiveDateTime>().unwrap();
        assert!(hours_until(&slot, later).unwrap() < 0.0);
    }
}
