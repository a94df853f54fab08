//! Authorization & dispatch runtime.

pub mod gatekeeper;
pub mod handlers;
pub mod methods;
pub mod pending;

pub use gatekeeper::{Collaborators, Gatekeeper};
pub use methods::{JsonRpcMethod, MethodTable, Partition, PrivateHandler, PublicHandler};
pub use pending::{AuthorizationState, PendingAuthorization};
