/// Error code reported by futures that were invalidated or released.
pub const ERROR_FUTURE_IS_NO_LONGER_VALID: i32 = -1;

pub const ERROR_MESSAGE_FUTURE_IS_NO_LONGER_VALID: &str = "Invalid Future";
