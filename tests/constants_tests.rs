// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use stylecam::constants::{self, StreamResolution};

#[test]
fn test_stream_resolution_values() {
    // Test that all presets exist (SD, 720p, HD)
    assert_eq!(StreamResolution::ALL.len(), 3);
}

#[test]
fn test_stream_resolution_ordering() {
    // Test that presets are ordered from smallest to largest
    let mut prev = 0u32;
    for preset in StreamResolution::ALL {
        let max = preset.max_dimension();
        assert!(max > prev, "Presets should be ordered from smallest to largest");
        prev = max;
    }
}

#[test]
fn test_stream_resolution_display_names() {
    for preset in StreamResolution::ALL {
        let name = preset.display_name();
        assert!(
            !name.is_empty(),
            "Preset {:?} has empty display name",
            preset
        );
    }
}

#[test]
fn test_failure_thresholds() {
    // Unsupported formats are a configuration problem and fail fast;
    // layout glitches are tolerated for longer
    assert!(
        constants::DEFAULT_MAX_UNSUPPORTED_FORMAT_FAILURES < constants::DEFAULT_MAX_LAYOUT_FAILURES
    );
    assert!(constants::DEFAULT_MAX_UNSUPPORTED_FORMAT_FAILURES >= 1);
}

#[test]
fn test_analysis_fits_a_few_frames() {
    assert!(constants::DEFAULT_ANALYSIS_TIMEOUT_MS > constants::DEFAULT_FRAME_BUDGET_MS);
    assert!(constants::DEFAULT_POOL_BUFFERS_PER_SIZE >= 2);
}

#[test]
fn test_version_is_set() {
    assert!(!constants::app_info::version().is_empty());
}
