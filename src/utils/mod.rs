pub mod clock;
pub mod naming;
pub mod serde;

pub use clock::{Clock, ManualClock, SystemClock};
pub use naming::{append_timestamp, scoped_name};
