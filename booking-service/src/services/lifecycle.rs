//! Booking state machine.
//!
//! The transition table is reified here as one pure function over the two
//! status axes, so illegal transitions are rejected centrally instead of by
//! accident of a query filter. Persistence still repeats each precondition
//! in the Mongo update filter, which is what makes a stale document
//! indistinguishable from an absent one at the API surface.

use service_core::error::AppError;
use thiserror::Error;

use crate::models::{BookingStatus, CancelledBy, PaymentStatus, ServiceStatus};

/// Snapshot of the state-machine-relevant booking fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingState {
    pub status: BookingStatus,
    pub service_status: ServiceStatus,
    pub payment_status: PaymentStatus,
    pub has_partner: bool,
}

impl BookingState {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    PaymentCompleted,
    PaymentFailed,
    PartnerAssigned,
    ServiceStarted,
    ServiceCompleted,
    Cancel(CancelledBy),
}

/// Result of a legal transition: the statuses to persist plus whether the
/// refund settlement engine must run (only when cancelling a booking that
/// had already been scheduled, i.e. commission was taken).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: BookingStatus,
    pub service_status: ServiceStatus,
    pub payment_status: PaymentStatus,
    pub cancelled_by: Option<CancelledBy>,
    pub settle: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("booking is in a terminal state")]
    Terminal,
    #[error("event not permitted from {status:?}/{service_status:?}")]
    NotPermitted {
        status: BookingStatus,
        service_status: ServiceStatus,
    },
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            // A booking past its precondition state is indistinguishable
            // from an absent one at the API surface: the precondition rides
            // in the query filter, so a stale document simply doesn't match.
            TransitionError::Terminal | TransitionError::NotPermitted { .. } => {
                AppError::NotFound(anyhow::anyhow!("booking not found"))
            }
        }
    }
}

pub fn transition(state: &BookingState, event: BookingEvent) -> Result<Transition, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::Terminal);
    }

    let not_permitted = || TransitionError::NotPermitted {
        status: state.status,
        service_status: state.service_status,
    };

    let unchanged = Transition {
        status: state.status,
        service_status: state.service_status,
        payment_status: state.payment_status,
        cancelled_by: None,
        settle: false,
    };

    match event {
        BookingEvent::PaymentCompleted => {
            if state.payment_status != PaymentStatus::Pending {
                return Err(not_permitted());
            }
            Ok(Transition {
                payment_status: PaymentStatus::Completed,
                // A partner may already be waiting; the slot is committed
                // the moment both payment and partner are in place.
                service_status: if state.has_partner {
                    ServiceStatus::Scheduled
                } else {
                    ServiceStatus::Pending
                },
                ..unchanged
            })
        }
        BookingEvent::PaymentFailed => {
            if state.payment_status != PaymentStatus::Pending {
                return Err(not_permitted());
            }
            Ok(Transition {
                status: BookingStatus::Failed,
                service_status: ServiceStatus::Cancelled,
                payment_status: PaymentStatus::Failed,
                ..unchanged
            })
        }
        BookingEvent::PartnerAssigned => {
            if state.service_status != ServiceStatus::Pending || state.has_partner {
                return Err(not_permitted());
            }
            Ok(Transition {
                status: BookingStatus::Processing,
                service_status: if state.payment_status == PaymentStatus::Completed {
                    ServiceStatus::Scheduled
                } else {
                    ServiceStatus::Pending
                },
                ..unchanged
            })
        }
        BookingEvent::ServiceStarted => {
            if state.service_status != ServiceStatus::Scheduled {
                return Err(not_permitted());
            }
            Ok(Transition {
                service_status: ServiceStatus::Ongoing,
                ..unchanged
            })
        }
        BookingEvent::ServiceCompleted => {
            if state.service_status != ServiceStatus::Ongoing {
                return Err(not_permitted());
            }
            Ok(Transition {
                status: BookingStatus::Completed,
                service_status: ServiceStatus::Completed,
                ..unchanged
            })
        }
        BookingEvent::Cancel(by) => {
            if !matches!(
                state.service_status,
                ServiceStatus::Pending | ServiceStatus::Scheduled
            ) {
                return Err(not_permitted());
            }
            Ok(Transition {
                status: BookingStatus::Cancelled,
                service_status: ServiceStatus::Cancelled,
                cancelled_by: Some(by),
                // A still-pending booking has taken no partner commission
                // and needs no settlement.
                settle: state.service_status == ServiceStatus::Scheduled,
                ..unchanged
            })
        }
    }
}
