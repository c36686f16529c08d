pub mod feed;
#[cfg(feature = "integration_firmata")]
pub mod firmata;
pub mod publish;
