pub mod camera_stream;
pub mod ffmpeg_camera;
pub mod memory_frame_source;
