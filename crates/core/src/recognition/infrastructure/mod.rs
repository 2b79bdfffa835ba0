pub mod enrollment;
pub mod face_alignment;
pub mod onnx_arcface_extractor;
pub mod recognition_pool;
pub mod scripted_extractor;
