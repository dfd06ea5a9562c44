#![allow(dead_code)]

pub use dynosup_test_utils::builders;
pub use dynosup_test_utils::fake_driver;
pub use dynosup_test_utils::{init_tracing, with_timeout};
