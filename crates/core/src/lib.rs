pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{Role, Transcript, Turn};
pub use domain::fragment::{FragmentBody, FragmentId, FragmentLog, FragmentPhase, UiFragment};
pub use domain::record::{CustomerRecord, ProductRecord};
pub use errors::{ApplicationError, DomainError, InterfaceError};
