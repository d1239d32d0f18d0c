pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod warehouse;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
pub use domain::backend::{Backend, ModelSelection};
pub use domain::conversation::{ConversationState, RowRecord};
pub use errors::{ApplicationError, ConfigurationError, DomainError, InterfaceError};
pub use flows::{TurnEngine, TurnNode, TurnPolicy};
pub use warehouse::{ExecutionError, QueryExecutor, SchemaCatalog, TableSchema};
