pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;

pub use approvals::{fingerprint, ApprovalLimits, ApprovalProtocol};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::action::{
    ActionRequest, ApprovalOutcome, Preview, PreviewToken, Receipt, Rejection,
};
pub use domain::capability::{
    CapabilityDescriptor, CapabilityRegistry, EndpointRef, IdempotencyClass, InputSchema,
};
pub use domain::invocation::{InvocationRequest, InvocationResult};
pub use errors::{ErrorKind, InterfaceError};
pub use gateway::{CapabilityGateway, GatewaySettings, RetryPolicy};
