// src/constants.rs
//
// Centralized constants for affectdl to avoid hardcoded values throughout the codebase

/// Default number of samples per batch
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default time-axis cap used for `max_pad` and split-level normalization
pub const DEFAULT_MAX_SEQ_LEN: usize = 50;

/// Default number of concurrent sample fetches per loader
pub const DEFAULT_NUM_WORKERS: usize = 2;

/// Width of the text embedding consumed by the discrete-family models
pub const MELD_TEXT_DIM: usize = 300;

// ============================================================================
// Archive layout
// ============================================================================

/// Split names of the continuous family, in load order
pub const SPLITS: [&str; 3] = ["train", "valid", "test"];

pub const TEXT: &str = "text";
pub const AUDIO: &str = "audio";
pub const VISION: &str = "vision";
pub const LABELS: &str = "labels";

/// Sequence modalities in sample order (vision, audio, text)
pub const MODALITIES: [&str; 3] = [VISION, AUDIO, TEXT];

pub const TOKEN_IDS: &str = "token_ids";
pub const VIDEO_FEATURES: &str = "video_features";
pub const AUDIO_FEATURES: &str = "audio_features";
pub const LABEL: &str = "label";

/// Extension numpy appends to every array stored in an `.npz` archive
pub const NPY_EXT: &str = ".npy";
