pub mod frame;
pub mod pending_queue;
pub mod ring_buffer;
pub mod stereo_buffer;
