mod execution_provider;
pub mod onnx_yolo_detector;
pub mod replay_detector;
