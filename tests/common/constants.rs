//! Shared constants for end-to-end tests

use std::time::Duration;

/// Email configured as the library admin
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Approved account without admin rights
pub const READER_EMAIL: &str = "reader@example.com";

/// Location reported by the scripted catalog source
pub const SCRIPTED_LOCATION: &str = "/scripted/books";

/// Upper bound for any job to reach a terminal state
pub const JOB_TIMEOUT: Duration = Duration::from_secs(20);

/// Smallest valid PNG header, enough for image sniffing
pub const PNG_COVER: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52,
];
