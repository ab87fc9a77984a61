//! Process exit codes. Scripts depend on these values.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CORRUPT: i32 = 1; // Integrity scan found damaged artifacts
pub const EXIT_ERROR: i32 = 2; // Bad arguments, I/O failure or failed pipeline
