mod actuator;
mod debounce;
pub mod link;
pub mod state;
mod state_machine;

pub use actuator::ActuatorController;
pub use actuator::Lamps;
pub use debounce::InputSink;
pub use debounce::SwitchDebouncer;
pub use link::HardwareLink;
pub use link::LinkError;
pub use link::LinkStatus;
pub use state::LampColor;
pub use state::SpaceState;
pub use state::SwitchContact;
pub use state::SwitchReading;
pub use state_machine::resolve;
pub use state_machine::SpaceStateMachine;
pub use state_machine::Subscriber;
