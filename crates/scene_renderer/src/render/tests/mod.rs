//! Cross-component scenarios that run without a GPU

mod frame_pacing;
