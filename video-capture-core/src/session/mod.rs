pub mod clock;
pub mod controller;
pub(crate) mod finalize;
pub mod recorder;
