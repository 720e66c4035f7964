pub mod capture_delegate;
pub mod encoder_program;
pub mod frame_source;
pub mod render_settings;
