pub mod account;
pub mod booking;
pub mod cancellation_fee;
pub mod catalog;
pub mod ledger;

pub use account::{Customer, Partner};
pub use booking::{
    fold_rating, AppliedOffer, AssignedPartner, Booking, BookingStatus, CancelledBy, Discount,
    LineItem, Meridiem, PaymentMethod, PaymentStatus, ScheduleSlot, ServiceAddress, ServiceStatus,
};
pub use cancellation_fee::{CancellationFeeRecord, FeeStatus};
pub use catalog::Product;
pub use ledger::{AccountKind, Direction, EntryStatus, Gateway, LedgerEntry, TransactionType};
