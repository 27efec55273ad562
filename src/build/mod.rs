//! Build core: state, verbs, dispatcher, and container lifecycle

pub mod builder;
pub mod lifecycle;
pub mod observer;
pub mod state;
pub mod verbs;

pub use builder::{BuildOptions, Builder};
pub use lifecycle::{AbortHandle, ContainerLifecycle};
pub use observer::{
    JournalObserver, MultiObserver, RecordingObserver, StepObserver, StepOutcome, StepRecord,
    TracingObserver,
};
pub use state::{BuildOutput, BuildState};
pub use verbs::{ArgSpec, VerbDef, VerbKind, VERB_TABLE};
