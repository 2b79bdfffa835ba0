pub mod bytetrack_tracker;
pub mod execution_provider;
pub mod onnx_yolo_detector;
pub mod scripted_detector;
