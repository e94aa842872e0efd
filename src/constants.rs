//! # constants
//!
//! Common constants used throughout the library.

/// Annotation table file name, relative to the dataset root.
pub const ANNOTATIONS_FILE_NAME: &str = "annotations.csv";

/// Validation-membership mask file name, relative to the dataset root.
pub const IS_VAL_FILE_NAME: &str = "is_val.npy";

/// Column holding the image path relative to the dataset root.
pub const IM_NAME_COLUMN: &str = "im_name";

/// Column holding the high-level driving direction command.
pub const DIRECTION_COLUMN: &str = "direction";

/// Column holding the recorded-drive identifier.
pub const SEQ_ID_COLUMN: &str = "seq_id";

/// Temporary column used while filtering the annotation table by split.
pub const IS_VAL_COLUMN: &str = "is_val";

/// Annotation table columns.
/// Found in `annotations.csv`; any other column is ignored.
pub const ANNOTATION_COLUMNS: [&str; 9] = [
    "im_name",
    "direction",
    "seq_id",
    "red_light",
    "hazard_stop",
    "speed_sign",
    "relative_angle",
    "center_distance",
    "veh_distance",
];

/// Vocabulary of the boolean affordances (`red_light`, `hazard_stop`).
pub const BOOLEAN_VOCABULARY: [bool; 2] = [false, true];

/// Vocabulary of the speed-sign affordance.
/// `-1` means no sign is visible, otherwise the signed speed limit.
pub const SPEED_SIGN_VOCABULARY: [i64; 4] = [-1, 30, 60, 90];

/// Matching tolerance for float vocabularies.
pub const FLOAT_VOCABULARY_TOLERANCE: f64 = 1e-3;

/// Crop box `(left, upper, right, lower)` applied to every raw frame.
pub const DEFAULT_CROP_BOX: [u32; 4] = [0, 120, 800, 480];

/// Scale factor applied after cropping.
pub const DEFAULT_RESCALE: f32 = 0.4;

/// Per-channel mean used for normalization (ImageNet statistics).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation used for normalization (ImageNet statistics).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
