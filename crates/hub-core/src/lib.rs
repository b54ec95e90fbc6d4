pub mod clock;
pub mod events;
pub mod models;
pub mod money;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{
    Notification, NotificationLevel, NotificationState, NotificationTarget, NotificationType,
};
pub use models::{
    Actor, ActorContext, ActorKind, Address, BankAccount, ContractProcedure, DeclarationOfIntent,
    InvoiceSettings, PriceProfile, SettlementInterval,
};
pub use state::{Lifecycle, StateCodeError, StateGraph, TransitionError};
