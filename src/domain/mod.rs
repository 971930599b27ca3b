pub mod event;
pub mod history;
pub mod point;

pub use event::{FailureData, FailureEvent, FailureEventType};
pub use history::{HistoryStatus, PointHistory, TransitionError};
pub use point::{
    AccumulationResult, NewPointTransaction, PartnerType, PointRequest, PointTransaction,
    TransactionStatus,
};
