/// ONNX execution providers to register on a new session.
///
/// ort falls back to CPU when a listed provider cannot be initialised, so
/// an empty list (or `use_gpu == false`) means plain CPU inference.
pub fn execution_providers(use_gpu: bool) -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    if !use_gpu {
        return Vec::new();
    }
    platform_providers()
}

#[cfg(target_os = "macos")]
fn platform_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
}

#[cfg(target_os = "windows")]
fn platform_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    Vec::new()
}
