pub const DEFAULT_MODEL_NAME: &str = "yolov8n.onnx";

/// Objects the scanner watches for when no allow-list is configured.
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "cell phone",
    "wallet",
    "bottle",
    "laptop",
    "backpack",
    "keyboard",
    "mouse",
    "book",
    "handbag",
    "cup",
];

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_FRAME_SKIP: usize = 2;
/// Sampled frames a label may go undetected before its event is flushed.
pub const DEFAULT_PERSISTENCE_WINDOW: u64 = 5;
/// Nominal capture rate used to turn an observed frame count into seconds.
pub const DEFAULT_ASSUMED_FRAME_RATE: f64 = 30.0;

pub const DEFAULT_EVENTS_FILE: &str = "detections.csv";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Class names of the 80-class COCO label set, in model output order.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
