pub mod fps_counter;
pub mod frame_renderer;
pub mod recognition_loop;
