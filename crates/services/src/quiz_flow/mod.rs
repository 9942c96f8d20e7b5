//! Sequencing of a lesson's quizzes: resume, attempt, score, retry, advance.

mod controller;
mod machine;
mod navigation;
mod state;
mod view;

pub use controller::QuizFlowController;
pub use machine::FlowMachine;
pub use navigation::{NavigationTrigger, NoNavigation, RecordingNavigation};
pub use state::{FlowEffect, FlowEvent, FlowState, Ticket};
pub use view::{FinalResult, FlowProgress, FlowSnapshot};
