//! Request dispatching for the code playground.
//!
//! A request names an action in its query string. The [`Dispatcher`] decodes
//! the payload the action needs, rebuilds the submitted project against its
//! stored template, hands the result to a collaborator and writes one reply
//! back through the [`Exchange`].

pub mod collaborators;
pub mod diagnostics;
pub mod errors;
pub mod params;
pub mod payload;
pub mod project;
pub mod response;
pub mod router;
pub mod session;
pub mod transport;

pub use collaborators::{
    CaretPosition, Collaborators, Completer, Converter, Executor, Highlighter, ProgramStore,
};
pub use diagnostics::{Diagnostics, ErrorReport, TracingDiagnostics};
pub use errors::{DecodeError, DispatchError, ReconstructionError, TransportError};
pub use params::{Action, RequestParameters};
pub use payload::{PostData, DEFAULT_PROGRAM};
pub use project::{reconstruct, ProjectDescriptor, ProjectFile, TemplateStore};
pub use response::{ContentKind, Reply, Status};
pub use router::Dispatcher;
pub use session::{RequestType, RunConfiguration, SessionInfo, UserInfo};
pub use transport::{BufferedExchange, Exchange};
