/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Width and height of a model's expected input, in pixels.
pub type Dimensions = (u32, u32);
