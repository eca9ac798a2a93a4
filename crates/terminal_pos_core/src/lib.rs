pub mod candidates;
pub mod collect;
pub mod domain;
pub mod error;
pub mod ports;
pub mod terminal;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use candidates::{CandidateQuery, CandidateReport, CandidateSearch};
pub use collect::{wait_for_inputs, CollectionState, EmailCapture, InputCollector, PollPolicy};
pub use domain::{
    CandidateCustomer, CollectInputsAction, CollectPrompt, Customer, CustomerDetail, PlatformEvent,
    Reader, SessionId, TerminalSession,
};
pub use error::{PosError, PosResult};
pub use ports::{PaymentPlatform, PortError, PortResult, SessionStore};
pub use terminal::{Selection, SelectionStatus, TerminalSelector};
