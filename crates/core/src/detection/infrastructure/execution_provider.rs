use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware execution providers registered ahead of the CPU default.
///
/// ONNX Runtime falls back to CPU when a listed provider is unavailable.
pub fn platform_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}
