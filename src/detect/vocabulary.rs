//! Class vocabularies.

/// COCO-80 labels, in the order YOLOv8/YOLO11 exports emit class scores.
pub const COCO_CLASSES: [&str; 80] = [
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

/// Label for a class index. Indices outside the vocabulary get a synthetic
/// `class_<id>` label, which never matches a vehicle category.
pub fn coco_label(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|label| label.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_ids_match_coco_order() {
        assert_eq!(coco_label(1), "bicycle");
        assert_eq!(coco_label(2), "car");
        assert_eq!(coco_label(3), "motorcycle");
        assert_eq!(coco_label(5), "bus");
        assert_eq!(coco_label(7), "truck");
        assert_eq!(coco_label(80), "class_80");
    }
}
