pub mod enums;
pub mod evidence;
pub mod metrics;
pub mod reading;

pub use enums::*;
pub use evidence::*;
pub use metrics::*;
pub use reading::*;
