//! 外部编码器（FFmpeg）
//!
//! 定位、能力探测与单次调用。编码本身完全委托给外部进程。

pub mod invocation;
pub mod locator;
pub mod prober;

pub use invocation::{BitDepth, EncodeProfile, Invocation, InvocationOutcome, Normalization};
pub use locator::{INSTALL_GUIDE, locate_encoder};
pub use prober::{detect_version, probe};
