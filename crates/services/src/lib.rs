#![forbid(unsafe_code)]

pub mod api_client;
pub mod error;
pub mod quiz_flow;

pub use api_client::{ApiClient, ApiConfig};
pub use error::{ApiConfigError, FlowError};
pub use quiz_flow::{
    FinalResult, FlowEffect, FlowEvent, FlowMachine, FlowProgress, FlowSnapshot, FlowState,
    NavigationTrigger, NoNavigation, QuizFlowController, RecordingNavigation, Ticket,
};
